//! cpal device enumeration and lookup
//!
//! Devices are listed from every available host so a cue can be pointed at
//! a specific ALSA/PulseAudio/CoreAudio device by [`DeviceId`].

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};
use crate::types::{CHANNELS, SAMPLE_RATE};

/// Display name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn get_host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|id| host_name(*id) == name)
        .and_then(|id| cpal::host_from_id(id).ok())
}

/// An output device as seen during enumeration
#[derive(Debug, Clone)]
pub struct AudioDevice {
    pub id: DeviceId,
    /// Whether this is the default output of its host
    pub is_default: bool,
    /// Whether some supported config covers 44100 Hz with two or more channels
    pub supports_cue_format: bool,
    /// Maximum output channels
    pub max_channels: u16,
}

impl std::fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id.display_label())?;
        if self.is_default {
            write!(f, " (default)")?;
        }
        if !self.supports_cue_format {
            write!(f, " [no 44.1 kHz stereo]")?;
        }
        Ok(())
    }
}

/// Whether a supported config range can carry the cue format
pub(super) fn covers_cue_format(range: &cpal::SupportedStreamConfigRange) -> bool {
    range.channels() as usize >= CHANNELS
        && range.min_sample_rate().0 <= SAMPLE_RATE
        && range.max_sample_rate().0 >= SAMPLE_RATE
}

/// Get all output devices from all hosts, default devices first
pub fn get_output_devices() -> AudioResult<Vec<AudioDevice>> {
    let mut all_devices: Vec<AudioDevice> = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_label = host_name(host_id);

        let default_name = host
            .default_output_device()
            .and_then(|d: cpal::Device| d.name().ok());

        let devices = match host.output_devices() {
            Ok(d) => d,
            Err(e) => {
                log::debug!("Could not enumerate devices for {:?}: {}", host_id, e);
                continue;
            }
        };

        for device in devices {
            let Ok(name) = device.name() else { continue };
            let Ok(ranges) = device.supported_output_configs() else {
                continue;
            };
            let ranges: Vec<_> = ranges.collect();
            if ranges.is_empty() {
                continue;
            }

            all_devices.push(AudioDevice {
                is_default: default_name.as_deref() == Some(name.as_str()),
                supports_cue_format: ranges.iter().any(covers_cue_format),
                max_channels: ranges.iter().map(|r| r.channels()).max().unwrap_or(0),
                id: DeviceId::with_host(&name, &host_label),
            });
        }
    }

    if all_devices.is_empty() {
        return Err(AudioError::NoDevices);
    }

    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.id.host.cmp(&b.id.host))
            .then_with(|| a.id.name.cmp(&b.id.name))
    });

    log::info!("Enumerated {} audio output devices", all_devices.len());
    Ok(all_devices)
}

/// Find a device by its ID
///
/// Uses the host named in the ID when there is one, otherwise searches all hosts.
pub fn find_device_by_id(id: &DeviceId) -> AudioResult<cpal::Device> {
    if let Some(host) = id.host.as_deref().and_then(get_host_by_name) {
        return host
            .output_devices()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .find(|d: &cpal::Device| d.name().ok().as_ref() == Some(&id.name))
            .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()));
    }

    for host_id in cpal::available_hosts() {
        let Ok(host) = cpal::host_from_id(host_id) else {
            continue;
        };
        let Ok(mut devices) = host.output_devices() else {
            continue;
        };
        let matching = devices.find(|d: &cpal::Device| d.name().ok().as_ref() == Some(&id.name));
        if let Some(device) = matching {
            return Ok(device);
        }
    }

    Err(AudioError::DeviceNotFound(id.display_label()))
}

/// Default output device of the default host
pub fn get_cpal_default_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::NoDefaultDevice("No default output device".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_enumeration() {
        // Passes on machines without audio hardware too
        match get_output_devices() {
            Ok(devices) => {
                println!("Found {} audio devices:", devices.len());
                for device in &devices {
                    println!("  - {} ({} channels)", device, device.max_channels);
                }
            }
            Err(AudioError::NoDevices) => {
                println!("No audio devices available (expected in CI)");
            }
            Err(e) => {
                println!("Error enumerating devices: {}", e);
            }
        }
    }

    #[test]
    fn test_unknown_device_not_found() {
        let id = DeviceId::new("cuemix-test-no-such-device");
        assert!(find_device_by_id(&id).is_err());
    }
}
