//! Output device listing and lookup across every cpal host

use std::fmt;

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Rates worth advertising in a device listing
const COMMON_RATES: [u32; 6] = [44100, 48000, 88200, 96000, 176400, 192000];

/// An output device as shown to the user
#[derive(Debug, Clone)]
pub struct AudioDevice {
    pub id: DeviceId,
    pub is_default: bool,
    /// Entries of [`COMMON_RATES`] the device accepts
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
}

impl fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if self.is_default {
            f.write_str(" [default]")?;
        }
        Ok(())
    }
}

fn host_label(id: HostId) -> String {
    let debug = format!("{:?}", id);
    match debug.as_str() {
        "Alsa" | "Jack" | "Wasapi" | "Asio" => debug.to_uppercase(),
        _ => debug,
    }
}

/// Hosts that initialize on this machine, with their labels
fn hosts() -> impl Iterator<Item = (String, Host)> {
    cpal::available_hosts().into_iter().filter_map(|id| match cpal::host_from_id(id) {
        Ok(host) => Some((host_label(id), host)),
        Err(e) => {
            log::debug!("Skipping audio host {:?}: {}", id, e);
            None
        }
    })
}

fn describe(device: &cpal::Device, host: &str, default_name: Option<&str>) -> Option<AudioDevice> {
    let name = device.name().ok()?;
    let ranges: Vec<_> = device.supported_output_configs().ok()?.collect();
    if ranges.is_empty() {
        return None;
    }

    let max_channels = ranges.iter().map(|r| r.channels()).max().unwrap_or(0);
    let sample_rates = COMMON_RATES
        .into_iter()
        .filter(|&rate| {
            ranges
                .iter()
                .any(|r| (r.min_sample_rate().0..=r.max_sample_rate().0).contains(&rate))
        })
        .collect();

    Some(AudioDevice {
        is_default: default_name == Some(name.as_str()),
        id: DeviceId::with_host(&name, host),
        sample_rates,
        max_channels,
    })
}

/// Every usable output device, defaults first, then by host and name
pub fn output_devices() -> AudioResult<Vec<AudioDevice>> {
    let mut found = Vec::new();

    for (label, host) in hosts() {
        let default_name = host.default_output_device().and_then(|d| d.name().ok());
        match host.output_devices() {
            Ok(devices) => found.extend(
                devices.filter_map(|device| describe(&device, &label, default_name.as_deref())),
            ),
            Err(e) => log::debug!("Could not list {} devices: {}", label, e),
        }
    }

    if found.is_empty() {
        return Err(AudioError::NoOutputDevice);
    }
    found.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.id.host.cmp(&b.id.host))
            .then_with(|| a.id.name.cmp(&b.id.name))
    });

    log::info!("Found {} audio output devices", found.len());
    Ok(found)
}

fn named(host: &Host, name: &str) -> AudioResult<Option<cpal::Device>> {
    Ok(host
        .output_devices()?
        .find(|d| d.name().map(|n| n == name).unwrap_or(false)))
}

/// Resolve a configured device
///
/// A host named in the id is searched alone when it exists on this machine.
pub fn find_device_by_id(id: &DeviceId) -> AudioResult<cpal::Device> {
    let pinned = id
        .host
        .as_deref()
        .and_then(|wanted| hosts().find(|(label, _)| label == wanted));

    if let Some((_, host)) = pinned {
        return named(&host, &id.name)?.ok_or_else(|| AudioError::DeviceNotFound(id.to_string()));
    }

    hosts()
        .find_map(|(_, host)| named(&host, &id.name).ok().flatten())
        .ok_or_else(|| AudioError::DeviceNotFound(id.to_string()))
}

/// Default output device of the default host
pub fn default_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or(AudioError::NoOutputDevice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_listing() {
        // Machines without sound hardware report no device
        match output_devices() {
            Ok(devices) => {
                assert!(devices.iter().all(|d| !d.id.name.is_empty() && d.id.host.is_some()));
                let defaults = devices.iter().take_while(|d| d.is_default).count();
                assert!(devices[defaults..].iter().all(|d| !d.is_default));
            }
            Err(AudioError::NoOutputDevice) => {}
            Err(e) => println!("Device listing failed: {}", e),
        }
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let id = DeviceId::with_host("no-such-device-for-tonearm", "NoSuchHost");
        assert!(matches!(find_device_by_id(&id), Err(AudioError::DeviceNotFound(_))));
    }
}
