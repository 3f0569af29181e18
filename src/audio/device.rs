//! Output device enumeration and lookup

use cpal::traits::{DeviceTrait, HostTrait};

use crate::config::DEFAULT_DEVICE;
use crate::error::AudioError;
use crate::protocol::AudioDeviceInfo;

const OUTPUT_PREFIX: &str = "output:";

/// Build the id a device is selected by
pub fn device_id(name: &str) -> String {
    format!("{}{}", OUTPUT_PREFIX, name)
}

/// Strip the id prefix, older configs stored bare device names
fn device_name(id: &str) -> &str {
    id.strip_prefix(OUTPUT_PREFIX).unwrap_or(id)
}

/// List all available output devices
///
/// The first entry is always the `"default"` sentinel.
pub fn list_output_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let mut devices = vec![AudioDeviceInfo {
        id: DEFAULT_DEVICE.to_string(),
        name: "System default".to_string(),
        is_default: true,
        sample_rates: Vec::new(),
        channels: Vec::new(),
    }];

    let default_output_name = host
        .default_output_device()
        .and_then(|d| d.name().ok());

    match host.output_devices() {
        Ok(output_devices) => {
            for device in output_devices {
                if let Ok(name) = device.name() {
                    if devices.iter().any(|d| d.name == name) {
                        continue;
                    }
                    let (sample_rates, channels) = get_device_capabilities(&device);
                    devices.push(AudioDeviceInfo {
                        id: device_id(&name),
                        is_default: default_output_name.as_ref() == Some(&name),
                        name,
                        sample_rates,
                        channels,
                    });
                }
            }
        }
        Err(e) => tracing::warn!("Failed to enumerate output devices: {}", e),
    }

    devices
}

/// Get device capabilities
fn get_device_capabilities(device: &cpal::Device) -> (Vec<u32>, Vec<u16>) {
    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();

    if let Ok(configs) = device.supported_output_configs() {
        for config in configs {
            // Common sample rates
            for rate_val in [44100u32, 48000, 88200, 96000, 176400, 192000] {
                let rate = cpal::SampleRate(rate_val);
                if rate >= config.min_sample_rate()
                    && rate <= config.max_sample_rate()
                    && !sample_rates.contains(&rate_val)
                {
                    sample_rates.push(rate_val);
                }
            }

            let ch = config.channels();
            if !channels.contains(&ch) {
                channels.push(ch);
            }
        }
    }

    sample_rates.sort();
    channels.sort();

    (sample_rates, channels)
}

/// Resolve an output device id
///
/// `"default"` (or an empty id) resolves to the host's default output.
pub fn find_output_device(id: &str) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();

    if id.is_empty() || id == DEFAULT_DEVICE {
        return host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()));
    }

    let name = device_name(id);
    let devices = host
        .output_devices()
        .map_err(|e| AudioError::CpalError(e.to_string()))?;

    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name == name {
                return Ok(device);
            }
        }
    }

    Err(AudioError::DeviceNotFound(id.to_string()))
}
