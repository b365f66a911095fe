mod assembly;
mod error;
mod settings;

use assembly::Assembler;
use classweave::jvm::code::*;
use classweave::jvm::{Error, TypeKind};
use error::CliError;
use settings::Settings;

use clap::{crate_version, value_parser, Arg, ArgAction, Command};

fn main() -> Result<(), CliError> {
    env_logger::init();

    let matches = Command::new("Locals shifter")
        .version(crate_version!())
        .author("Alec Theriault <alec.theriault@gmail.com>")
        .about("Inject a bytecode fragment into a host method, moving its locals to fresh slots")
        .arg(
            Arg::new("descriptor")
                .long("descriptor")
                .value_name("DESCRIPTOR")
                .default_value("()V")
                .help("Descriptor of the host method (eg. `(IJ)V`)"),
        )
        .arg(
            Arg::new("static")
                .long("static")
                .action(ArgAction::SetTrue)
                .help("Host method is static (no `this` in slot 0)"),
        )
        .arg(
            Arg::new("host-locals")
                .long("host-locals")
                .value_name("N")
                .value_parser(value_parser!(u16))
                .default_value("0")
                .help("Number of `int` locals the host allocates before the fragment"),
        )
        .arg(
            Arg::new("buffered")
                .long("buffered")
                .action(ArgAction::SetTrue)
                .help("Buffer elements and encode them at the end (also lists the elements)"),
        )
        .arg(
            Arg::new("block")
                .long("block")
                .action(ArgAction::SetTrue)
                .help("Inject the fragment inside a block"),
        )
        .arg(
            Arg::new("FRAGMENT")
                .help("Fragment to inject, one element per line (`-` for stdin)")
                .default_value("-")
                .index(1),
        )
        .get_matches();

    let mut settings = Settings::new(
        matches
            .get_one::<String>("FRAGMENT")
            .map_or("-", String::as_str),
        matches
            .get_one::<String>("descriptor")
            .map_or("()V", String::as_str),
        matches.get_flag("static"),
    )?;
    settings.host_locals = matches.get_one::<u16>("host-locals").copied().unwrap_or(0);
    settings.buffered = matches.get_flag("buffered");
    settings.block = matches.get_flag("block");

    let source = settings.read_fragment()?;
    let mut assembler = Assembler::new();

    let body = if settings.buffered {
        let mut code = BufferedCodeBuilder::new(settings.host_flags, &settings.host_descriptor)?;
        let fragment = assembler.parse(&source, &mut code)?;
        inject(&mut code, &settings, fragment)?;
        for element in code.elements() {
            println!("    {}", element);
        }
        code.finish()?
    } else {
        let mut code = DirectCodeBuilder::new(settings.host_flags, &settings.host_descriptor)?;
        let fragment = assembler.parse(&source, &mut code)?;
        inject(&mut code, &settings, fragment)?;
        code.finish()?
    };

    println!("max_locals: {}", body.max_locals);
    let hex: Vec<String> = body.code.iter().map(|byte| format!("{:02x}", byte)).collect();
    println!("code: {}", hex.join(" "));
    for (name, label) in assembler.labels() {
        match body.label_offset(label) {
            Some(offset) => println!("{}: {}", name, offset),
            None => println!("{}: unbound", name),
        }
    }
    Ok(())
}

/// Allocate the host's own locals, then push the fragment through a locals shifter
fn inject(
    code: &mut dyn CodeBuilder,
    settings: &Settings,
    fragment: Vec<CodeElement>,
) -> Result<(), Error> {
    for _ in 0..settings.host_locals {
        code.allocate_local(TypeKind::Int)?;
    }
    log::info!(
        "Injecting {} elements above local {}",
        fragment.len(),
        top_local(&*code)
    );

    let shifter = CodeLocalsShifter::of(settings.host_flags, &settings.host_descriptor)?;
    if settings.block {
        code.block(|block| {
            block.transform_elements(fragment, shifter)?;
            Ok(())
        })?;
    } else {
        code.transform_elements(fragment, shifter)?;
    }
    Ok(())
}
