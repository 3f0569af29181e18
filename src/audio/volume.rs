//! System master volume
//!
//! Levels are whole percentages (0 - 100). Each platform gets its own backend:
//! the default render endpoint on Windows, `osascript` on macOS and the ALSA
//! `Master` control through `amixer` elsewhere.

use async_trait::async_trait;

use crate::error::VolumeError;

/// Read/write access to the system master volume
#[async_trait]
pub trait SystemVolume: Send + Sync {
    async fn get_volume(&self) -> Result<u8, VolumeError>;
    async fn set_volume(&self, level: u8) -> Result<(), VolumeError>;
}

/// Platform mixer
#[derive(Debug, Default, Clone)]
pub struct SystemMixer;

impl SystemMixer {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(windows)]
mod platform {
    use windows::Win32::Media::Audio::Endpoints::IAudioEndpointVolume;
    use windows::Win32::Media::Audio::{eConsole, eRender, IMMDeviceEnumerator, MMDeviceEnumerator};
    use windows::Win32::System::Com::{
        CoCreateInstance, CoInitializeEx, CLSCTX_ALL, COINIT_MULTITHREADED,
    };

    use crate::error::VolumeError;

    fn endpoint() -> windows::core::Result<IAudioEndpointVolume> {
        unsafe {
            // Already-initialized apartments report S_FALSE or RPC_E_CHANGED_MODE
            let _ = CoInitializeEx(None, COINIT_MULTITHREADED);
            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)?;
            let device = enumerator.GetDefaultAudioEndpoint(eRender, eConsole)?;
            device.Activate(CLSCTX_ALL, None)
        }
    }

    pub fn get_volume() -> Result<u8, VolumeError> {
        let endpoint = endpoint().map_err(|e| VolumeError::Unavailable(e.to_string()))?;
        let scalar = unsafe { endpoint.GetMasterVolumeLevelScalar() }
            .map_err(|e| VolumeError::ReadFailed(e.to_string()))?;
        Ok((scalar * 100.0).round().clamp(0.0, 100.0) as u8)
    }

    pub fn set_volume(level: u8) -> Result<(), VolumeError> {
        let endpoint = endpoint().map_err(|e| VolumeError::Unavailable(e.to_string()))?;
        unsafe { endpoint.SetMasterVolumeLevelScalar(level as f32 / 100.0, std::ptr::null()) }
            .map_err(|e| VolumeError::WriteFailed {
                level,
                reason: e.to_string(),
            })
    }
}

#[cfg(windows)]
#[async_trait]
impl SystemVolume for SystemMixer {
    async fn get_volume(&self) -> Result<u8, VolumeError> {
        tokio::task::spawn_blocking(platform::get_volume)
            .await
            .map_err(|e| VolumeError::ReadFailed(e.to_string()))?
    }

    async fn set_volume(&self, level: u8) -> Result<(), VolumeError> {
        tokio::task::spawn_blocking(move || platform::set_volume(level))
            .await
            .map_err(|e| VolumeError::WriteFailed {
                level,
                reason: e.to_string(),
            })?
    }
}

#[cfg(not(windows))]
async fn run_tool(program: &str, args: &[String]) -> Result<String, String> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| format!("{}: {}", program, e))?;
    if !output.status.success() {
        return Err(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(target_os = "macos")]
#[async_trait]
impl SystemVolume for SystemMixer {
    async fn get_volume(&self) -> Result<u8, VolumeError> {
        let args = vec!["-e".to_string(), "output volume of (get volume settings)".to_string()];
        let stdout = run_tool("osascript", &args)
            .await
            .map_err(VolumeError::ReadFailed)?;
        stdout
            .trim()
            .parse::<u8>()
            .map(|v| v.min(100))
            .map_err(|e| VolumeError::ReadFailed(format!("unexpected output {:?}: {}", stdout.trim(), e)))
    }

    async fn set_volume(&self, level: u8) -> Result<(), VolumeError> {
        let level = level.min(100);
        let args = vec!["-e".to_string(), format!("set volume output volume {}", level)];
        run_tool("osascript", &args)
            .await
            .map(|_| ())
            .map_err(|reason| VolumeError::WriteFailed { level, reason })
    }
}

/// Extract the first `[NN%]` field of `amixer` output
#[cfg(all(not(windows), not(target_os = "macos")))]
fn parse_amixer_level(output: &str) -> Option<u8> {
    output.split('[').skip(1).find_map(|field| {
        let value = field.split(']').next()?;
        let percent = value.strip_suffix('%')?;
        percent.trim().parse::<u8>().ok().map(|v| v.min(100))
    })
}

#[cfg(all(not(windows), not(target_os = "macos")))]
#[async_trait]
impl SystemVolume for SystemMixer {
    async fn get_volume(&self) -> Result<u8, VolumeError> {
        let args = vec!["-M".to_string(), "get".to_string(), "Master".to_string()];
        let stdout = run_tool("amixer", &args)
            .await
            .map_err(VolumeError::Unavailable)?;
        parse_amixer_level(&stdout)
            .ok_or_else(|| VolumeError::ReadFailed("no level in amixer output".to_string()))
    }

    async fn set_volume(&self, level: u8) -> Result<(), VolumeError> {
        let level = level.min(100);
        let args = vec![
            "-M".to_string(),
            "set".to_string(),
            "Master".to_string(),
            format!("{}%", level),
        ];
        run_tool("amixer", &args)
            .await
            .map(|_| ())
            .map_err(|reason| VolumeError::WriteFailed { level, reason })
    }
}
