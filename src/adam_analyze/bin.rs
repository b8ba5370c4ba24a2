use adam::prelude::AdamResult;
use adam::{adam_analyze, cli};

fn main() -> AdamResult<()> {
    let args = cli::analyze().get_matches();
    adam_analyze::run(&args)
}
