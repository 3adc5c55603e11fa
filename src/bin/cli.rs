//! Hivekit command line interface.

use std::{process, time::Duration};

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_t, App, AppSettings::*, Arg,
    ArgMatches, SubCommand,
};
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password, Select};
use log::{debug, trace, LevelFilter};
use simplelog::*;

use hivekit::{
    self as hk, DeviceDetector, FleetOrchestrator, FleetStore, PlatformIo,
    SerialConnector, Settings, SystemPorts, TcpProbe, TermOperator,
};

fn main() {
    println!("[HK] hivekit v{}", crate_version!());

    ctrlc::set_handler(move || {
        println!("🛑 received Ctrl+C!");
        process::exit(130);
    })
    .expect("Failed to install my Ctrl-C handler!");

    let matches = App::new(crate_name!())
        .version(format!("v{}", crate_version!()).as_str())
        .author(crate_authors!())
        .about(crate_description!())
        .long_about(
            "\n\
            Hivekit sets up a network of biosensors. For a new network it asks \
            for the number of biosensors and for the WiFi and MQTT broker \
            credentials, saves them in a directory named after the network, \
            generates the firmware header and then, for each biosensor: \n\
               \t* waits for the biosensor to be plugged in \n\
               \t* builds and uploads the firmware with PlatformIO \n\
               \t* optionally checks that it joins the WiFi and the broker \n\
            \n\
            The configuration of an already provisioned biosensor can be read \
            back over its serial port and exported.\
        ",
        )
        .max_term_width(80)
        .setting(ColoredHelp)
        .setting(NextLineHelp)
        .arg(
            Arg::with_name("BAUD_RATE")
                .help("serial port baud rate of the firmware")
                .short("-b")
                .long("--baud-rate")
                .takes_value(true)
                .default_value("9600")
                .require_equals(true)
                .global(true),
        )
        .arg(
            Arg::with_name("PROJECT_DIR")
                .help("path to the PlatformIO firmware project")
                .short("-p")
                .long("--project-dir")
                .takes_value(true)
                .default_value("ESPCode")
                .require_equals(true)
                .global(true),
        )
        .arg(
            Arg::with_name("BUILD_ENV")
                .help("PlatformIO build environment (e.g. `debug`)")
                .short("-e")
                .long("--env")
                .takes_value(true)
                .require_equals(true)
                .global(true),
        )
        .arg(
            Arg::with_name("FLEETS_DIR")
                .help("directory holding the network configurations")
                .short("-d")
                .long("--fleets-dir")
                .takes_value(true)
                .default_value(".")
                .require_equals(true)
                .global(true),
        )
        .arg(
            Arg::with_name("HANDSHAKE_TIMEOUT")
                .help("seconds to wait for each answer of a biosensor")
                .long_help(
                    "seconds to wait for each connection report of a \
                     biosensor during the handshake, and for its answer to \
                     `read`; when not set, the timeouts of the firmware \
                     itself are relied upon.",
                )
                .long("--handshake-timeout")
                .takes_value(true)
                .require_equals(true)
                .global(true),
        )
        .arg(
            Arg::with_name("BROKER")
                .help("MQTT broker `host:port` for the reachability check")
                .long("--broker")
                .takes_value(true)
                .default_value("maqiatto.com:1883")
                .require_equals(true)
                .global(true),
        )
        .arg(
            Arg::with_name("NO_BROKER_CHECK")
                .help("skip the broker reachability check")
                .long("--no-broker-check")
                .global(true),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .global(true)
                .help(
                    "Sets the logging level of verbosity, repeat several times for \
                     higher verbosity",
                ),
        )
        .subcommand(
            SubCommand::with_name("setup")
                .about("set up a new network or reprogram an existing one")
                .arg(Arg::with_name("BNN").help("the network name").index(1)),
        )
        .subcommand(
            SubCommand::with_name("read")
                .about("read the configuration from a provisioned biosensor"),
        )
        .subcommand(
            SubCommand::with_name("show")
                .about("show a saved network configuration")
                .arg(Arg::with_name("BNN").required(true).index(1)),
        )
        .subcommand(
            SubCommand::with_name("delete")
                .about("delete a saved network configuration")
                .arg(Arg::with_name("BNN").required(true).index(1)),
        )
        .get_matches();

    // Vary the output based on how many times the user used the "verbose" flag
    // (i.e. 'hivekit -v -v -v' or 'hivekit -vvv' vs 'hivekit -v'
    let log_level = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    TermLogger::init(
        log_level,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .unwrap();

    trace!("{:#?}", matches);

    let settings = settings_from(&matches);
    let store = FleetStore::new(&settings.fleets_dir);
    let check_broker = !matches.is_present("NO_BROKER_CHECK");

    let result = match matches.subcommand() {
        ("setup", Some(sub)) => setup(settings, &store, sub.value_of("BNN"), check_broker),
        ("read", _) => read(&settings, &store),
        ("show", Some(sub)) => show(&store, sub.value_of("BNN").unwrap()),
        ("delete", Some(sub)) => delete(&store, sub.value_of("BNN").unwrap()),
        _ => menu(settings, &store, check_broker),
    };

    let exit_code = match result {
        Ok(()) => 0,
        Err(e) => {
            println!("{}: {}", style("error").red(), e);
            e.exit_code()
        }
    };
    debug!("exit code: {}", exit_code);
    println!("[HK] Thank you for using hivekit");
    process::exit(exit_code);
}

fn settings_from(matches: &ArgMatches) -> Settings {
    // Arguments with default values ===========================================

    let baud_rate = value_t!(matches.value_of("BAUD_RATE"), u32).unwrap_or_else(|_| {
        println!(
            "{}: `{}` needs to be a numeric value",
            style("error").red(),
            style("baud-rate").cyan()
        );
        process::exit(-1);
    });

    let broker = matches.value_of("BROKER").unwrap();
    let (broker_host, broker_port) = match broker.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => (host, port),
            Err(_) => invalid_value("broker", broker),
        },
        None => (broker, 1883),
    };

    let mut builder = hk::SettingsBuilder::new()
        .baud_rate(baud_rate)
        .project_dir(matches.value_of("PROJECT_DIR").unwrap())
        .fleets_dir(matches.value_of("FLEETS_DIR").unwrap())
        .broker(broker_host, broker_port);

    // Arguments with NO default values ========================================

    if let Some(env) = matches.value_of("BUILD_ENV") {
        builder = builder.build_env(env);
    }
    if matches.is_present("HANDSHAKE_TIMEOUT") {
        let secs = value_t!(matches.value_of("HANDSHAKE_TIMEOUT"), u64).unwrap_or_else(|_| {
            invalid_value(
                "handshake-timeout",
                matches.value_of("HANDSHAKE_TIMEOUT").unwrap(),
            )
        });
        builder = builder.handshake_timeout(Duration::from_secs(secs));
    }

    builder.finalize()
}

fn invalid_value(name: &str, value: &str) -> ! {
    println!(
        "{}: `{}` is not a valid value for `{}`",
        style("error").red(),
        style(value).on_red(),
        style(name).cyan()
    );
    process::exit(-1);
}

// =============================================================================
// Actions
// =============================================================================

fn menu(settings: Settings, store: &FleetStore, check_broker: bool) -> hk::Result<()> {
    let items = [
        "Setup a new network",
        "Read config from an existing network",
        "Exit",
    ];
    let choice = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("What would you like to do?")
        .items(&items)
        .default(0)
        .interact_opt()?;
    match choice {
        Some(0) => setup(settings, store, None, check_broker),
        Some(1) => read(&settings, store),
        _ => Ok(()),
    }
}

fn setup(
    settings: Settings,
    store: &FleetStore,
    name: Option<&str>,
    check_broker: bool,
) -> hk::Result<()> {
    let theme = ColorfulTheme::default();
    let name = match name {
        Some(name) => name.to_string(),
        None => Input::<String>::with_theme(&theme)
            .with_prompt("Please input the desired BNN")
            .interact_text()?,
    };

    if let Some(config) = store.load(&name)? {
        println!("[HK] You've already configured a network called {}", style(&name).cyan());
        println!();
        println!("{}", config.dump());
        let again = Confirm::with_theme(&theme)
            .with_prompt("Would you like to reconfigure your devices?")
            .default(true)
            .interact()?;
        if !again {
            return Ok(());
        }
        return provision(settings, store, &config, check_broker);
    }

    let size = Input::<u32>::with_theme(&theme)
        .with_prompt("Please input the number of biosensors")
        .validate_with(|size: &u32| -> Result<(), &str> {
            if *size > 0 {
                Ok(())
            } else {
                Err("a network needs at least one biosensor")
            }
        })
        .interact_text()?;
    let mqtt_user = Input::<String>::with_theme(&theme)
        .with_prompt("Please input your MQTT Username")
        .interact_text()?;
    let mqtt_password = Password::with_theme(&theme)
        .with_prompt("Please input your MQTT Password")
        .interact()?;
    let wifi_ssid = Input::<String>::with_theme(&theme)
        .with_prompt("Please input WiFi SSID")
        .interact_text()?;
    let wifi_password = Password::with_theme(&theme)
        .with_prompt("Please input WiFi Password")
        .allow_empty_password(true)
        .interact()?;

    let config = hk::Config::new(name, size, wifi_ssid, wifi_password, mqtt_user, mqtt_password)?;
    export(store, &config)?;
    provision(settings, store, &config, check_broker)
}

fn provision(
    mut settings: Settings,
    store: &FleetStore,
    config: &hk::Config,
    check_broker: bool,
) -> hk::Result<()> {
    settings.verify_connectivity = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Is the chosen WiFi network available here?")
        .default(false)
        .interact()?;

    let toolchain = PlatformIo::new(&settings);
    let connector = SerialConnector::new(settings.clone());
    let probe = TcpProbe::new(&settings);
    let mut fleet = FleetOrchestrator::new(
        &settings,
        &SystemPorts,
        &toolchain,
        &connector,
        &TermOperator,
    );

    let probe: Option<&dyn hk::BrokerProbe> = if check_broker { Some(&probe) } else { None };
    fleet.prepare(config, store, probe)?;

    let outcomes = fleet.run(config)?;
    match hk::first_failure(&outcomes) {
        Some(failed) => failed.clone().into_result(),
        None => Ok(()),
    }
}

fn read(settings: &Settings, store: &FleetStore) -> hk::Result<()> {
    let theme = ColorfulTheme::default();
    let ready = Confirm::with_theme(&theme)
        .with_prompt("Connect a biosensor. Is it connected?")
        .default(true)
        .interact()?;
    if !ready {
        return Ok(());
    }

    let port = DeviceDetector::new(&SystemPorts).detect()?;
    debug!("current biosensor: {}", port);
    let connector = SerialConnector::new(settings.clone());
    let info = hk::query_device(&connector, &port, settings.handshake_timeout)?;
    print_device_status(&info);
    let config = info.into_config()?;
    println!();
    println!("{}", config.dump());

    let export_it = Confirm::with_theme(&theme)
        .with_prompt("Would you like to export it?")
        .default(true)
        .interact()?;
    if export_it {
        export(store, &config)?;
    }
    Ok(())
}

/// Prints what the firmware reports about itself, beyond the configuration.
fn print_device_status(info: &hk::DeviceInfo) {
    if let Some(version) = &info.version {
        println!("[HK] Firmware version: {}", version);
    }
    if let Some(number) = info.device_number {
        println!("[HK] Biosensor number: {}", number);
    }
    if let (Some(server), Some(port)) = (&info.mqtt_server, info.mqtt_port) {
        println!("[HK] Broker: {}:{}", server, port);
    }
    if let Some(prefix) = &info.mqtt_prefix {
        println!("[HK] Topic prefix: {}", prefix);
    }
    let flag = |connected: Option<bool>| match connected {
        Some(true) => style("connected").green(),
        Some(false) => style("not connected").red(),
        None => style("unknown").dim(),
    };
    println!(
        "[HK] WiFi: {}, MQTT: {}",
        flag(info.connected_wifi),
        flag(info.connected_mqtt)
    );
}

fn show(store: &FleetStore, name: &str) -> hk::Result<()> {
    match store.load(name)? {
        Some(config) => println!("{}", config.dump()),
        None => println!("[HK] No network called {}", style(name).cyan()),
    }
    Ok(())
}

fn delete(store: &FleetStore, name: &str) -> hk::Result<()> {
    let sure = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Delete the network configuration of {}?", name))
        .default(false)
        .interact()?;
    if sure {
        if store.delete(name)? {
            println!("[HK] {} network configuration is now deleted", name);
        } else {
            println!("[HK] No network called {}", style(name).cyan());
        }
    }
    Ok(())
}

/// Saves `config`, asking before replacing an existing one.
fn export(store: &FleetStore, config: &hk::Config) -> hk::Result<()> {
    if store.exists(config.name()) {
        let overwrite = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Found a config with the same name. Overwrite it?")
            .default(false)
            .interact()?;
        if !overwrite {
            return Ok(());
        }
        println!("[HK] Overwritten with new config!");
    }
    let path = store.save(config)?;
    println!("[HK] Configuration saved to {}", style(path.display()).green());
    Ok(())
}
