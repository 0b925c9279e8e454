use crate::types::{RouteCandidate, RouteKind, RouteTable};
use ipnet::Ipv6Net;
use slog::{debug, info, Logger};
use std::{
    ffi::OsString,
    io,
    net::Ipv6Addr,
    path::PathBuf,
    process::{Command, ExitStatus, Output, Stdio},
};

/// Prefix lengths tried when clearing a stale kernel route before installing
/// its replacement. The length a stale route was installed with isn't tracked,
/// so the same network at any of these lengths is removed unless the route
/// table still owns it (see [`RouteRequest::keep_tracked`]).
pub const STALE_PREFIX_LENGTHS: [u8; 3] = [48, 56, 64];

/// Everything the kernel route needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteRequest {
    pub prefix: Ipv6Net,
    pub interface: String,
    pub router: Ipv6Addr,
    pub kind: RouteKind,
    /// Lengths at which the network is removed before the route is replaced
    pub stale_lengths: Vec<u8>,
}

impl RouteRequest {
    pub fn new(candidate: &RouteCandidate, interface: &str) -> Self {
        let mut stale_lengths = STALE_PREFIX_LENGTHS.to_vec();
        if !stale_lengths.contains(&candidate.prefix.prefix_len()) {
            stale_lengths.push(candidate.prefix.prefix_len());
        }
        Self {
            prefix: candidate.prefix,
            interface: interface.to_string(),
            router: candidate.router,
            kind: candidate.kind,
            stale_lengths,
        }
    }

    /// Drop stale lengths naming another route the table still tracks, so
    /// installing one route never removes another live one.
    pub fn keep_tracked(mut self, table: &RouteTable) -> Self {
        let network = self.prefix.network();
        let own = self.prefix_len();
        self.stale_lengths.retain(|&len| {
            len == own
                || !Ipv6Net::new(network, len)
                    .map(|key| table.contains(&key.trunc()))
                    .unwrap_or(false)
        });
        self
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix.prefix_len()
    }

    pub fn is_prefix(&self) -> bool {
        self.kind.is_prefix()
    }

    fn kind_str(&self) -> &'static str {
        if self.is_prefix() {
            "prefix"
        } else {
            "route"
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteOutput {
    pub stdout: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("failed to run {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Installs or replaces the kernel route for a request. Called once per new or
/// changed route; failures are reported, never retried.
pub trait RouteInstaller {
    fn apply(&mut self, req: &RouteRequest) -> Result<RouteOutput, RouteError>;
}

impl<T: RouteInstaller + ?Sized> RouteInstaller for Box<T> {
    fn apply(&mut self, req: &RouteRequest) -> Result<RouteOutput, RouteError> {
        (**self).apply(req)
    }
}

fn run(cmd: &mut Command, program: &str) -> Result<Output, RouteError> {
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|source| RouteError::Spawn {
            program: program.to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(RouteError::Failed {
            program: program.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        });
    }
    Ok(output)
}

/// Drives the kernel routing table through `ip -6 route`.
pub struct IpRouteInstaller {
    program: String,
    log: Logger,
}

impl IpRouteInstaller {
    pub fn new(log: Logger) -> Self {
        Self::with_program("ip", log)
    }

    pub fn with_program(program: &str, log: Logger) -> Self {
        Self {
            program: program.to_string(),
            log,
        }
    }

    fn del_args(req: &RouteRequest, prefix_len: u8) -> Vec<String> {
        vec![
            "-6".into(),
            "route".into(),
            "del".into(),
            format!("{}/{prefix_len}", req.prefix.network()),
            "dev".into(),
            req.interface.clone(),
        ]
    }

    fn replace_args(req: &RouteRequest) -> Vec<String> {
        let mut args = vec![
            "-6".into(),
            "route".into(),
            "replace".into(),
            req.prefix.to_string(),
        ];
        // on-link prefixes are reached directly, everything else through the advertiser
        if !req.is_prefix() {
            args.extend(["via".into(), req.router.to_string()]);
        }
        args.extend(["dev".into(), req.interface.clone()]);
        args
    }
}

impl RouteInstaller for IpRouteInstaller {
    fn apply(&mut self, req: &RouteRequest) -> Result<RouteOutput, RouteError> {
        for &len in &req.stale_lengths {
            let args = Self::del_args(req, len);
            // best effort: most of these don't exist
            if let Err(e) = run(Command::new(&self.program).args(&args), &self.program) {
                debug!(self.log, "stale route removal skipped";
                    "args" => args.join(" "), "error" => %e);
            }
        }

        let args = Self::replace_args(req);
        info!(self.log, "configuring {}", req.kind_str();
            "program" => &self.program, "args" => args.join(" "));
        let output = run(Command::new(&self.program).args(&args), &self.program)?;
        Ok(RouteOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}

/// Hands each request to an external executable through its environment:
/// `PREFIX`, `PREFIX_LEN`, `IFACE`, `ROUTER` and `IS_PREFIX` (`1` or `0`).
pub struct ScriptInstaller {
    script: PathBuf,
    log: Logger,
}

impl ScriptInstaller {
    pub fn new(script: PathBuf, log: Logger) -> Self {
        Self { script, log }
    }

    fn env(req: &RouteRequest) -> Vec<(&'static str, OsString)> {
        vec![
            ("PREFIX", req.prefix.network().to_string().into()),
            ("PREFIX_LEN", req.prefix_len().to_string().into()),
            ("IFACE", req.interface.clone().into()),
            ("ROUTER", req.router.to_string().into()),
            ("IS_PREFIX", if req.is_prefix() { "1" } else { "0" }.into()),
        ]
    }
}

impl RouteInstaller for ScriptInstaller {
    fn apply(&mut self, req: &RouteRequest) -> Result<RouteOutput, RouteError> {
        let program = self.script.display().to_string();
        info!(self.log, "running route script";
            "script" => &program,
            "PREFIX" => %req.prefix.network(),
            "PREFIX_LEN" => req.prefix_len(),
            "IFACE" => &req.interface,
            "ROUTER" => %req.router,
            "TYPE" => req.kind_str());
        let output = run(Command::new(&self.script).envs(Self::env(req)), &program)?;
        Ok(RouteOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}
