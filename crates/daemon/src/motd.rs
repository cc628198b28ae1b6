//! Message-of-the-day templates
//!
//! Placeholders: `%v` version, `%i` first IPv4 address, `%m` machine name,
//! `%d` today's date, `%n` DNS host name. A host fact is only looked up
//! when its placeholder occurs in the template.

use chrono::NaiveDate;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};

const VERSION: &str = "%v";
const IPV4: &str = "%i";
const MACHINE_NAME: &str = "%m";
const DATE: &str = "%d";
const DNS_NAME: &str = "%n";

/// Facts about the local host used by templates
pub trait HostInfo: Send + Sync {
    fn version(&self) -> String;
    fn first_ipv4(&self) -> Option<Ipv4Addr>;
    fn machine_name(&self) -> String;
    fn today(&self) -> NaiveDate;
    fn dns_hostname(&self) -> String;
}

/// Host facts read from the running system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHostInfo;

impl HostInfo for SystemHostInfo {
    fn version(&self) -> String {
        logonbroker_common::VERSION.to_string()
    }

    fn first_ipv4(&self) -> Option<Ipv4Addr> {
        let host = self.dns_hostname();
        (host.as_str(), 0)
            .to_socket_addrs()
            .ok()?
            .find_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None,
            })
    }

    fn machine_name(&self) -> String {
        self.dns_hostname()
            .split('.')
            .next()
            .unwrap_or_default()
            .to_uppercase()
    }

    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }

    fn dns_hostname(&self) -> String {
        whoami::fallible::hostname().unwrap_or_default()
    }
}

/// Expand the placeholders of `template`
pub fn format_motd(template: &str, host: &dyn HostInfo) -> String {
    let mut motd = template.to_string();

    if motd.contains(VERSION) {
        motd = motd.replace(VERSION, &host.version());
    }
    if motd.contains(IPV4) {
        let ip = host.first_ipv4().map(|ip| ip.to_string()).unwrap_or_default();
        motd = motd.replace(IPV4, &ip);
    }
    if motd.contains(MACHINE_NAME) {
        motd = motd.replace(MACHINE_NAME, &host.machine_name());
    }
    if motd.contains(DATE) {
        let today = host.today().format("%B %d, %Y").to_string();
        motd = motd.replace(DATE, &today);
    }
    if motd.contains(DNS_NAME) {
        motd = motd.replace(DNS_NAME, &host.dns_hostname());
    }

    motd
}
