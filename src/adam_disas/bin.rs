use adam::prelude::AdamResult;
use adam::{adam_disas, cli};

fn main() -> AdamResult<()> {
    let args = cli::disas().get_matches();
    adam_disas::run(&args)
}
