use crate::error::{Error, Result};
use signal_hook::consts::{SIGINT, SIGTERM};
use slog::{Drain, FilterLevel, Logger};
use std::{
    ffi::CString,
    sync::{atomic::AtomicBool, Arc},
};

pub fn init_logger(level: FilterLevel) -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let mut builder = slog_envlogger::LogBuilder::new(drain).filter(None, level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder = builder.parse(&filters);
    }
    let drain = builder.build().fuse();
    let drain = slog_async::Async::new(drain)
        .chan_size(0x2000)
        .build()
        .fuse();
    slog::Logger::root(drain, slog::o!())
}

/// Returns 0 when no interface has this name.
pub fn ifname_to_ifindex(ifname: &str) -> Result<u32> {
    let ifstr =
        CString::new(ifname).map_err(|_| Error::InvalidInterfaceName(ifname.to_string()))?;
    let ifindex = unsafe { libc::if_nametoindex(ifstr.as_ptr()) };
    Ok(ifindex)
}

/// Route SIGINT and SIGTERM to a flag the listener polls between captures.
pub fn install_signal_handlers() -> Result<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    for signum in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signum, Arc::clone(&shutdown)).map_err(Error::Signal)?;
    }
    Ok(shutdown)
}
