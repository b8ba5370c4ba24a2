use crate::prelude::*;
use adam_code::Code;
use clap::ArgMatches;
use std::fs::{create_dir_all, File};
use std::io::Write;
use std::path::Path;

pub fn run(args: &ArgMatches) -> AdamResult<()> {
    init_logger(args);

    let program = open_input(args)?;
    log::info!(
        "{} classes, {} methods, {} instructions",
        program.nb_classes(),
        program.nb_methods(),
        program.nb_instructions()
    );

    for (class, method) in selected_methods(&program, args)? {
        let Some(code) = method.code() else { continue };
        println!("[*] {}", method.descriptor());

        if let Some(dot_dir) = args.get_one::<String>("output") {
            write_dot_file(dot_dir, class.name(), method.name(), code)?;
        } else {
            for block in code.iter_blocks() {
                println!("  {}:", block.label());
                for instr in block.instructions() {
                    println!("    {}: {}", instr.id(), instr.instr());
                }
            }
        }
    }

    Ok(())
}

fn write_dot_file<P: AsRef<Path>>(
    base_dir: P,
    class_name: &str,
    method_name: &str,
    code: &Code,
) -> AdamResult<()> {
    // prepare directory (base_dir/class_name)
    let mut dir = base_dir.as_ref().to_path_buf();
    dir.push(class_name.trim_start_matches('L').trim_end_matches(';'));
    create_dir_all(&dir)?;

    // write file
    dir.push(method_name);
    dir.set_extension("dot");
    let mut file = File::create(dir)?;
    file.write_all(code.to_dot().as_bytes())?;

    Ok(())
}
