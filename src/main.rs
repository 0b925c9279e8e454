use clap::Parser;
use ra_listener::{
    helpers::{init_logger, install_signal_handlers},
    Icmp6Capture, Interface, IpRouteInstaller, Listener, ListenerConfig, RouteInstaller,
    ScriptInstaller,
};
use slog::{crit, info, o, warn, FilterLevel, Logger};
use std::{path::PathBuf, process::ExitCode};

#[derive(Parser, Debug)]
#[command(
    name = "ra-listener",
    version,
    about = "ICMPv6 Router Advertisement listener for IPv6 ULA route configuration"
)]
struct Args {
    /// Network interface to monitor
    #[arg(short, long, default_value = "eth0", env = "RA_INTERFACE")]
    interface: String,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Log every advertisement and each route it carries
    #[arg(long)]
    verbose: bool,

    /// Send a Router Solicitation at startup instead of waiting for the next periodic advertisement
    #[arg(long)]
    enable_rs: bool,

    /// Log prefixes dropped because they aren't ULA
    #[arg(long)]
    log_ignored: bool,

    /// Executable that configures each route, called with PREFIX, PREFIX_LEN, IFACE, ROUTER
    /// and IS_PREFIX in its environment. Routes are configured with `ip -6 route` otherwise.
    #[arg(long, value_name = "PATH", env = "RA_ROUTE_SCRIPT")]
    route_script: Option<PathBuf>,
}

impl Args {
    fn log_level(&self) -> FilterLevel {
        if self.debug {
            FilterLevel::Debug
        } else {
            FilterLevel::Info
        }
    }

    fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            verbose: self.verbose,
            log_ignored: self.log_ignored,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let log = init_logger(args.log_level());

    let result = run(&args, &log);
    if let Err(e) = &result {
        crit!(log, "exiting"; "error" => %e);
    }
    // flush the async drain before exit
    drop(log);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

fn run(args: &Args, log: &Logger) -> ra_listener::Result<()> {
    info!(log, "ICMPv6 RA listener starting";
        "version" => env!("CARGO_PKG_VERSION"),
        "interface" => &args.interface,
        "debug" => args.debug,
        "verbose" => args.verbose,
        "router_solicitation" => args.enable_rs,
        "log_ignored" => args.log_ignored,
        "route_script" => args.route_script.as_ref().map(|p| p.display().to_string()));

    let iface = Interface::lookup(&args.interface)?;
    let shutdown = install_signal_handlers()?;

    let capture = Icmp6Capture::open(&iface, log.new(o!("component" => "capture")))?;
    if args.enable_rs {
        capture.solicit()?;
    }

    let installer_log = log.new(o!("component" => "configurator"));
    let installer: Box<dyn RouteInstaller> = match &args.route_script {
        Some(script) => Box::new(ScriptInstaller::new(script.clone(), installer_log)),
        None => Box::new(IpRouteInstaller::new(installer_log)),
    };

    let mut listener = Listener::new(
        args.listener_config(),
        iface,
        capture,
        installer,
        log.new(o!("component" => "listener")),
    );
    info!(log, "listener ready"; "state" => ?listener.state());
    let result = listener.run(&shutdown);
    info!(log, "listener finished"; "state" => ?listener.state());
    result?;

    match serde_json::to_string(listener.table()) {
        Ok(json) => info!(log, "final route table"; "routes" => json),
        Err(e) => warn!(log, "failed to serialize route table"; "error" => %e),
    }
    Ok(())
}
