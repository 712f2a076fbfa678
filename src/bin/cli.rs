//! Bootshell command line interface.

use std::{process, time::Duration};

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_t, App, AppSettings::*, Arg,
};
use console::style;
use log::{debug, trace, LevelFilter};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use simplelog::*;

use bootshell::{
    self as bs,
    platform::{SerialTransport, SimFlash},
    Session,
};

fn main() {
    println!("[BS] bootshell v{}", crate_version!());

    ctrlc::set_handler(move || {
        println!("🛑 received Ctrl+C!");
        process::exit(0);
    })
    .expect("Failed to install my Ctrl-C handler!");

    let matches = App::new(crate_name!())
        .version(format!("v{}", crate_version!()).as_str())
        .author(crate_authors!())
        .about(crate_description!())
        .long_about(
            "\n\
            Bootshell runs the update engine of a dual-slot bootloader on the \
            host, against a simulated flash device kept in a file. A host \
            tool connected to the other end of the serial line talks to it \
            exactly as it would talk to the board:\n\
               \t* one command per line, terminated by CR LF \n\
               \t* `help` lists the commands \n\
               \t* `update-new` stages an image, `update-act` installs it \n\
               \t* `exit` ends the session \n\
            \n\
            The flash image file is created fully erased when it does not \
            exist, and is kept up to date after every erase or write.\
        ",
        )
        .max_term_width(80)
        .setting(ColoredHelp)
        .setting(NextLineHelp)
        .arg(
            Arg::with_name("DEVICE_TTY")
                .help("the tty device to serve the shell on")
                .short("-t")
                .long("--tty")
                .takes_value(true)
                .required(true)
                .require_equals(true),
        )
        .arg(
            Arg::with_name("BAUD_RATE")
                .help("serial port baud rate")
                .short("-b")
                .long("--baud-rate")
                .takes_value(true)
                .default_value("115200")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("DATA_BITS")
                .help("number of bits per character")
                .short("-d")
                .long("--data-bits")
                .takes_value(true)
                .possible_values(&["5", "6", "7", "8"])
                .default_value("8")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("STOP_BITS")
                .help("number of stop bits per byte")
                .short("-s")
                .long("--stop-bits")
                .takes_value(true)
                .possible_values(&["1", "2"])
                .default_value("1")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("PARITY")
                .help("parity checking protocol")
                .short("-p")
                .long("--parity")
                .takes_value(true)
                .possible_values(&["none", "odd", "even"])
                .default_value("none")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("FLOW_CONTROL")
                .help("flow control mode")
                .short("-f")
                .long("--flow-control")
                .takes_value(true)
                .possible_values(&["none", "soft", "hard"])
                .default_value("none")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("CHUNK_SIZE")
                .help("bytes per transfer chunk, rounded down to a multiple of 4")
                .short("-c")
                .long("--chunk-size")
                .takes_value(true)
                .default_value("5120")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("TRANSFER_TIMEOUT")
                .help("seconds to wait for the data of one chunk")
                .long("--transfer-timeout")
                .takes_value(true)
                .default_value("10")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("FLASH_IMAGE")
                .help("file holding the simulated flash content")
                .long_help(
                    "file holding the simulated flash content; when not \
                     set, `bootshell` uses `flash.bin` in the current \
                     working directory.",
                )
                .long("--flash-image")
                .takes_value(true)
                .default_value("flash.bin")
                .require_equals(true),
        )
        .arg(Arg::with_name("v").short("v").multiple(true).help(
            "Sets the logging level of verbosity, repeat several times for \
                higher verbosity",
        ))
        .get_matches();

    // Vary the output based on how many times the user used the "verbose" flag
    // (i.e. 'bootshell -v -v -v' or 'bootshell -vvv' vs 'bootshell -v'
    let log_level = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    TermLogger::init(log_level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto).unwrap();

    trace!("{:#?}", matches);

    // Arguments with default values ===========================================

    // It's safe to call unwrap on all command line arguments with default
    // values, because the value with either be what the user input at runtime
    // or the default value

    let baud_rate = numeric_arg::<u32>(&matches, "BAUD_RATE", "baud-rate");
    let chunk_size = numeric_arg::<usize>(&matches, "CHUNK_SIZE", "chunk-size");
    let transfer_timeout = numeric_arg::<u64>(&matches, "TRANSFER_TIMEOUT", "transfer-timeout");

    let data_bits = match matches.value_of("DATA_BITS").unwrap() {
        "5" => DataBits::Five,
        "6" => DataBits::Six,
        "7" => DataBits::Seven,
        "8" => DataBits::Eight,
        _ => unreachable!(),
    };

    let stop_bits = match matches.value_of("STOP_BITS").unwrap() {
        "1" => StopBits::One,
        "2" => StopBits::Two,
        _ => unreachable!(),
    };

    let parity = match matches.value_of("PARITY").unwrap() {
        "none" => Parity::None,
        "even" => Parity::Even,
        "odd" => Parity::Odd,
        _ => unreachable!(),
    };

    let flow_control = match matches.value_of("FLOW_CONTROL").unwrap() {
        "none" => FlowControl::None,
        "soft" => FlowControl::Software,
        "hard" => FlowControl::Hardware,
        _ => unreachable!(),
    };

    let settings = bs::SettingsBuilder::default()
        .path(matches.value_of("DEVICE_TTY").unwrap())
        .baud_rate(baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .flow_control(flow_control)
        .chunk_size(chunk_size)
        .transfer_timeout(Duration::from_secs(transfer_timeout))
        .flash_image(matches.value_of("FLASH_IMAGE").unwrap())
        .finalize();

    // END - Arguments =========================================================

    let image = settings.flash_image.clone().unwrap_or_default();
    let flash = SimFlash::open(settings.layout.sectors.clone(), &image).unwrap_or_else(|e| {
        println!(
            "{}: cannot open flash image `{}`: {}",
            style("error").red(),
            style(&image).cyan(),
            e
        );
        process::exit(-1);
    });

    let transport = SerialTransport::open(&settings).unwrap_or_else(|e| {
        println!(
            "{}: cannot open serial port `{}`: {}",
            style("error").red(),
            style(settings.path.as_deref().unwrap_or_default()).cyan(),
            e
        );
        process::exit(-1);
    });
    println!(
        "[BS] 🔌 serving on {} with flash image {}",
        style(settings.path.as_deref().unwrap_or_default()).green(),
        style(&image).green()
    );

    // Run the shell ===========================================================

    let session = Session::new(settings, Box::new(flash), Box::new(transport));
    let mut shell = bs::shell::factory(session);
    let exit_code = shell.run();
    let stats = shell.stats();
    if exit_code == 0 {
        println!(
            "[BS] ✔ session ended, {} command(s), {} error(s)",
            stats.commands, stats.errors
        );
    } else {
        println!("{}", style("[BS] 💥 Lost the link to the host!").red());
    }
    debug!("exit code: {}", exit_code);
    process::exit(exit_code.into());
}

/// Parse a numeric argument that has a default value, or exit with a styled
/// message naming the offending option.
fn numeric_arg<T: std::str::FromStr>(matches: &clap::ArgMatches, name: &str, option: &str) -> T {
    value_t!(matches.value_of(name), T).unwrap_or_else(|_| {
        println!(
            "{}: `{}` needs to be a numeric value",
            style("error").red(),
            style(option).cyan()
        );
        println!(
            "   {} `{}` is not a valid value",
            style("-->").cyan(),
            style(matches.value_of(name).unwrap()).on_red()
        );
        process::exit(-1);
    })
}
