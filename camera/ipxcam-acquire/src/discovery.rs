//! Finding interfaces and devices.

use std::net::Ipv4Addr;
use std::time::Duration;

use tracing::{debug, info, warn};

use ipxcam::{DeviceInfo, Error, Interface, ParamTree, Result, System};
use ipxcam_types::{AccessStatus, INTERFACE_TYPE_ALL, InterfaceType};

pub const SUBNET_IP_ADDRESS: &str = "GevInterfaceSubnetIPAddress";
pub const SUBNET_MASK: &str = "GevInterfaceSubnetMask";

/// Which devices [find_devices] returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    /// Interface type code, [INTERFACE_TYPE_ALL] for every transport.
    pub interface_type: u32,
    /// Match against display name, serial number or unique id.
    pub name: Option<String>,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            interface_type: INTERFACE_TYPE_ALL,
            name: None,
        }
    }
}

impl DeviceFilter {
    pub fn by_name(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn accepts_interface(&self, kind: InterfaceType) -> bool {
        kind.matches_code(self.interface_type)
    }

    fn accepts(&self, info: &DeviceInfo) -> bool {
        match &self.name {
            Some(name) => info.matches_name(name),
            None => true,
        }
    }
}

/// The interface at `index`, or `None` if there is none.
pub fn select_interface<S: System>(system: &S, index: usize) -> Result<Option<S::Interface>> {
    Ok(system.interfaces()?.take(index))
}

/// Re-enumerate `iface` and return the device at `index`, if any.
pub fn select_device<I: Interface>(
    iface: &I,
    index: usize,
    timeout: Duration,
) -> Result<Option<DeviceInfo>> {
    iface.re_enumerate_devices(timeout)?;
    Ok(iface.device_info_list()?.take(index))
}

/// Re-enumerate every accepted interface and collect the matching devices.
///
/// Interfaces failing to enumerate are skipped with a warning.
pub fn find_devices<S: System>(
    system: &S,
    filter: &DeviceFilter,
    timeout: Duration,
) -> Result<Vec<(S::Interface, DeviceInfo)>>
where
    S::Interface: Clone,
{
    let mut found = Vec::new();
    for iface in system.interfaces()? {
        if !filter.accepts_interface(iface.interface_type()) {
            continue;
        }
        let list = match iface
            .re_enumerate_devices(timeout)
            .and_then(|_| iface.device_info_list())
        {
            Ok(list) => list,
            Err(e) => {
                warn!("enumerating {}: {e}", iface.id());
                continue;
            }
        };
        debug!("{}: {} devices", iface.id(), list.count());
        let matching: Vec<DeviceInfo> = list.into_iter().filter(|i| filter.accepts(i)).collect();
        for info in matching {
            found.push((iface.clone(), info));
        }
    }
    Ok(found)
}

/// Parse dotted quad notation. Returns 0 for anything malformed.
pub fn parse_ipv4(text: &str) -> u32 {
    text.trim().parse::<Ipv4Addr>().map(u32::from).unwrap_or(0)
}

/// Give a GigE Vision device with [AccessStatus::IpSubnetMismatch] an
/// address in the subnet of its interface.
///
/// If `ip` is `None` the first host address not used by the interface or a
/// visible device is chosen. Returns the refreshed snapshot of the device.
pub fn repair_subnet<I: Interface>(
    iface: &I,
    info: &DeviceInfo,
    ip: Option<u32>,
    timeout: Duration,
) -> Result<DeviceInfo> {
    if info.access_status != AccessStatus::IpSubnetMismatch {
        return Ok(info.clone());
    }
    let params = iface.parameters();
    let subnet = params.int_value(SUBNET_IP_ADDRESS)? as u32;
    let mask = params.int_value(SUBNET_MASK)? as u32;
    let ip = match ip {
        Some(ip) => ip,
        None => {
            let used: Vec<u32> = iface
                .device_info_list()?
                .iter()
                .filter_map(|i| i.network.as_ref().map(|n| u32::from(n.ip)))
                .collect();
            free_host_address(subnet, mask, &used).ok_or_else(|| {
                Error::WrongConfiguration(format!(
                    "no free address in {}/{}",
                    Ipv4Addr::from(subnet),
                    Ipv4Addr::from(mask)
                ))
            })?
        }
    };
    if subnet & mask != ip & mask {
        return Err(Error::InvalidArgument(format!(
            "{} is not in the interface subnet",
            Ipv4Addr::from(ip)
        )));
    }
    iface.force_ip(info, ip, mask, 0)?;
    info!("{} forced to {}", info.display_name, Ipv4Addr::from(ip));
    iface.re_enumerate_devices(timeout)?;
    iface
        .device_info_list()?
        .into_iter()
        .find(|i| i.unique_id == info.unique_id)
        .ok_or(Error::NoDevice)
}

fn free_host_address(subnet: u32, mask: u32, used: &[u32]) -> Option<u32> {
    let net = subnet & mask;
    let hosts = !mask;
    // skip the network and broadcast addresses
    (1..hosts)
        .map(|h| net | h)
        .find(|ip| *ip != subnet && !used.contains(ip))
}

#[cfg(test)]
mod test {
    use super::*;
    use ipxcam_sim::{SimCameraSpec, SimSystem};
    use ipxcam_types::DeviceAccess;

    #[test]
    fn test_parse_ipv4() {
        assert_eq!(parse_ipv4("192.168.1.10"), 0xc0a8_010a);
        assert_eq!(parse_ipv4(" 10.0.0.1 "), 0x0a00_0001);
        assert_eq!(parse_ipv4("10.0.0"), 0);
        assert_eq!(parse_ipv4("10.0.0.256"), 0);
        assert_eq!(parse_ipv4(""), 0);
    }

    #[test]
    fn test_free_host_address() {
        let subnet = parse_ipv4("192.168.1.1");
        let mask = parse_ipv4("255.255.255.0");
        assert_eq!(free_host_address(subnet, mask, &[]), Some(parse_ipv4("192.168.1.2")));
        assert_eq!(
            free_host_address(subnet, mask, &[parse_ipv4("192.168.1.2")]),
            Some(parse_ipv4("192.168.1.3"))
        );
        assert_eq!(free_host_address(subnet, 0xffff_fffe, &[]), None);
    }

    fn system() -> SimSystem {
        let mut usb = SimCameraSpec::new("usb1");
        usb.interface_type = InterfaceType::Usb3Vision;
        let mut far = SimCameraSpec::new("far");
        far.ip = Some(Ipv4Addr::new(10, 1, 2, 3));
        SimSystem::new(vec![SimCameraSpec::new("gev1"), usb, far]).unwrap()
    }

    #[test_log::test]
    fn test_select() {
        let system = system();
        let iface = select_interface(&system, 0).unwrap().unwrap();
        assert!(select_interface(&system, 2).unwrap().is_none());
        let info = select_device(&iface, 1, Duration::ZERO).unwrap().unwrap();
        assert_eq!(info.serial, "far");
        assert!(select_device(&iface, 5, Duration::ZERO).unwrap().is_none());
    }

    #[test_log::test]
    fn test_find_devices() {
        let system = system();
        let all = find_devices(&system, &DeviceFilter::default(), Duration::ZERO).unwrap();
        assert_eq!(all.len(), 3);
        let gev = DeviceFilter {
            interface_type: InterfaceType::GigEVision.code(),
            name: None,
        };
        assert_eq!(find_devices(&system, &gev, Duration::ZERO).unwrap().len(), 2);
        let by_name = find_devices(&system, &DeviceFilter::by_name("usb1"), Duration::ZERO).unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].0.interface_type(), InterfaceType::Usb3Vision);
        assert!(
            find_devices(&system, &DeviceFilter::by_name("nope"), Duration::ZERO)
                .unwrap()
                .is_empty()
        );
    }

    #[test_log::test]
    fn test_repair_subnet() {
        let system = system();
        let mut found =
            find_devices(&system, &DeviceFilter::by_name("far"), Duration::ZERO).unwrap();
        let (iface, info) = found.remove(0);
        assert_eq!(info.access_status, AccessStatus::IpSubnetMismatch);
        assert!(matches!(
            iface.create_device(&info, DeviceAccess::Control),
            Err(Error::IpSubnetMismatch)
        ));
        assert!(repair_subnet(&iface, &info, Some(parse_ipv4("10.0.0.1")), Duration::ZERO).is_err());

        let fixed = repair_subnet(&iface, &info, None, Duration::ZERO).unwrap();
        assert_eq!(fixed.access_status, AccessStatus::ReadWrite);
        let ip = fixed.network.as_ref().unwrap().ip;
        assert_eq!(ip.octets()[..3], [192, 168, 1]);
        // the other camera keeps its address
        assert_ne!(ip, Ipv4Addr::new(192, 168, 1, 10));
        assert!(iface.create_device(&fixed, DeviceAccess::Control).is_ok());
    }
}
