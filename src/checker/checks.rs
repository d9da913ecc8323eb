// ABOUTME: Concrete preflight checks: reachability, permissions, kernel, ports, clock, disks, engine.
// ABOUTME: Judges are pure functions over probe output so they test without a host.

use super::{Check, ProbeOutput};
use crate::command::{ContainerCommand, ShellCommand};
use crate::errno;
use crate::task::Slot;
use std::collections::BTreeSet;
use std::time::Duration;

const SSH_SLOT: Slot<ProbeOutput> = Slot::new("check.ssh");
const DIR_SLOT: Slot<ProbeOutput> = Slot::new("check.directory");
const KERNEL_SLOT: Slot<ProbeOutput> = Slot::new("check.kernel_version");
const MODULE_SLOT: Slot<ProbeOutput> = Slot::new("check.kernel_module");
const PORT_SLOT: Slot<ProbeOutput> = Slot::new("check.port");
const CLOCK_SLOT: Slot<ProbeOutput> = Slot::new("check.clock");
const DISK_SLOT: Slot<ProbeOutput> = Slot::new("check.disk");
const ENGINE_SLOT: Slot<ProbeOutput> = Slot::new("check.engine");

const SSH_MARKER: &str = "clusteradm-reachable";

pub fn ssh_reachable() -> Check {
    Check::new(
        "ssh reachable",
        SSH_SLOT,
        ShellCommand::command(format!("echo {SSH_MARKER}")),
        |probe: &ProbeOutput| {
            if probe.success && probe.output.contains(SSH_MARKER) {
                Ok(())
            } else {
                Err(errno::CONNECT_FAILED.clue(probe.output.clone()))
            }
        },
    )
}

/// Create `path` and a scratch file inside it.
pub fn directory_writable(path: &str) -> Check {
    let quoted = crate::command::shell_quote(path);
    let line = format!(
        "mkdir -p {quoted} && touch {quoted}/.clusteradm_check && rm -f {quoted}/.clusteradm_check"
    );
    let clue = path.to_string();
    Check::new(
        "directory permission",
        DIR_SLOT,
        ShellCommand::command(line),
        move |probe: &ProbeOutput| {
            if probe.success {
                Ok(())
            } else {
                Err(errno::PERMISSION_DENIED.clue(format!("{clue}: {}", probe.output.trim())))
            }
        },
    )
}

/// Parse `uname -r` (e.g. `5.4.0-42-generic`) into `(major, minor, patch)`.
pub fn parse_kernel_version(release: &str) -> Option<(u32, u32, u32)> {
    let numeric = release
        .trim()
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .next()?;
    let mut parts = numeric.split('.').map(|p| p.parse::<u32>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().and_then(Result::ok).unwrap_or(0);
    let patch = parts.next().and_then(Result::ok).unwrap_or(0);
    Some((major, minor, patch))
}

pub fn kernel_version(minimum: (u32, u32, u32)) -> Check {
    Check::new(
        "kernel version",
        KERNEL_SLOT,
        ShellCommand::uname().add_option("-r"),
        move |probe: &ProbeOutput| match parse_kernel_version(&probe.output) {
            Some(version) if probe.success && version >= minimum => Ok(()),
            _ => Err(errno::KERNEL_VERSION_TOO_LOW.clue(format!(
                "have {}, need {}.{}.{}",
                probe.output.trim(),
                minimum.0,
                minimum.1,
                minimum.2
            ))),
        },
    )
}

pub fn kernel_module(module: &str) -> Check {
    let module = module.to_string();
    Check::new(
        "kernel module",
        MODULE_SLOT,
        ShellCommand::command("lsmod"),
        move |probe: &ProbeOutput| {
            let loaded = probe
                .output
                .lines()
                .skip(1)
                .filter_map(|l| l.split_whitespace().next())
                .any(|name| name == module);
            if loaded {
                Ok(())
            } else {
                Err(errno::KERNEL_MODULE_MISSING.clue(module.clone()))
            }
        },
    )
}

/// Ports in `LISTEN`/`UNCONN` state from `ss -tuln` output.
pub fn listening_ports(ss_output: &str) -> BTreeSet<u16> {
    ss_output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let local = line.split_whitespace().nth(4)?;
            local.rsplit(':').next()?.parse().ok()
        })
        .collect()
}

pub fn port_available(port: u16) -> Check {
    Check::new(
        "port available",
        PORT_SLOT,
        ShellCommand::command("ss -tuln"),
        move |probe: &ProbeOutput| {
            if !probe.success {
                return Err(errno::COMMAND_FAILED.clue(probe.output.clone()));
            }
            if listening_ports(&probe.output).contains(&port) {
                Err(errno::PORT_IN_USE.clue(port.to_string()))
            } else {
                Ok(())
            }
        },
    )
}

/// Compare the host's epoch seconds with the operator's clock at judge time.
pub fn clock_skew(max_skew: Duration) -> Check {
    Check::new(
        "clock skew",
        CLOCK_SLOT,
        ShellCommand::date().add_option("+%s"),
        move |probe: &ProbeOutput| {
            let remote: i64 = probe
                .output
                .trim()
                .parse()
                .map_err(|_| errno::COMMAND_FAILED.clue(probe.output.clone()))?;
            let skew = (chrono::Utc::now().timestamp() - remote).unsigned_abs();
            if skew <= max_skew.as_secs() {
                Ok(())
            } else {
                Err(errno::CLOCK_SKEW_TOO_LARGE.clue(format!("{skew}s")))
            }
        },
    )
}

/// Whether `mount` output shows `device` mounted at `mount_point`.
pub fn is_mounted(mount_output: &str, device: &str, mount_point: &str) -> bool {
    mount_output.lines().any(|line| {
        let mut fields = line.split_whitespace();
        fields.next() == Some(device) && fields.next() == Some("on") && fields.next() == Some(mount_point)
    })
}

pub fn disk_mounted(device: &str, mount_point: &str) -> Check {
    let device = device.to_string();
    let mount_point = mount_point.to_string();
    Check::new(
        "disk formatted",
        DISK_SLOT,
        ShellCommand::command("mount"),
        move |probe: &ProbeOutput| {
            if probe.success && is_mounted(&probe.output, &device, &mount_point) {
                Ok(())
            } else {
                Err(errno::DISK_NOT_FORMATTED.clue(format!("{device} -> {mount_point}")))
            }
        },
    )
}

pub fn engine_present() -> Check {
    Check::new(
        "container engine",
        ENGINE_SLOT,
        ContainerCommand::info().format("{{.ServerVersion}}"),
        |probe: &ProbeOutput| {
            if probe.success {
                Ok(())
            } else {
                Err(errno::ENGINE_NOT_FOUND.clue(probe.output.clone()))
            }
        },
    )
}
