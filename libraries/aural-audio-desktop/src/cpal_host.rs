//! cpal-backed device host

use crate::error::{OutputError, Result};
use crate::host::{sort_devices, DeviceHost};
use crate::renderer::RenderHandle;
use aural_core::{DeviceDescriptor, DeviceEvent};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use crossbeam_channel::Sender;
use tracing::{debug, warn};

/// Native sample formats a stream can be built for
const SUPPORTED_FORMATS: [SampleFormat; 5] = [
    SampleFormat::F32,
    SampleFormat::F64,
    SampleFormat::I16,
    SampleFormat::I32,
    SampleFormat::U16,
];

/// Interleaved samples converted per callback without growing the scratch buffer
const SCRATCH_SAMPLES: usize = 16_384;

/// The platform's default audio host (WASAPI, CoreAudio, ALSA, ...)
#[derive(Debug, Clone, Copy)]
pub struct CpalHost {
    id: cpal::HostId,
}

impl CpalHost {
    /// Use the platform default host
    pub fn new() -> Self {
        Self {
            id: cpal::default_host().id(),
        }
    }

    /// Use a specific host, e.g. JACK or ASIO when compiled in
    pub fn with_id(id: cpal::HostId) -> Self {
        Self { id }
    }

    /// Host name
    pub fn name(&self) -> &'static str {
        self.id.name()
    }

    fn host(&self) -> Result<cpal::Host> {
        cpal::host_from_id(self.id).map_err(|e| OutputError::HostUnavailable(e.to_string()))
    }

    fn find(&self, wanted: &DeviceDescriptor) -> Result<cpal::Device> {
        let host = self.host()?;
        host.output_devices()?
            .find(|device| device_name(device).as_deref() == Some(wanted.id.as_str()))
            .ok_or_else(|| OutputError::DeviceNotFound(wanted.name.clone()))
    }
}

impl Default for CpalHost {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(deprecated)]
fn device_name(device: &cpal::Device) -> Option<String> {
    device.name().ok()
}

/// Describe a device by its default output format
///
/// Devices that cannot report a format are skipped.
fn describe(device: &cpal::Device, default_name: Option<&str>) -> Option<DeviceDescriptor> {
    let name = device_name(device)?;
    let config = match device.default_output_config() {
        Ok(config) => config,
        Err(e) => {
            debug!(device = %name, error = %e, "Skipping device without output config");
            return None;
        }
    };
    let is_default = default_name == Some(name.as_str());
    Some(DeviceDescriptor::new(
        name,
        config.sample_rate(),
        config.channels(),
        is_default,
    ))
}

fn stream_error(errors: Sender<DeviceEvent>) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        warn!(error = %err, "Audio stream error");
        let _ = errors.try_send(DeviceEvent::StreamError {
            reason: err.to_string(),
        });
    }
}

/// Stream in a non-f32 native format: render to f32, then convert
fn build_converted<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    render: RenderHandle,
    errors: Sender<DeviceEvent>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch = vec![0.0_f32; SCRATCH_SAMPLES];
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if scratch.len() < data.len() {
                scratch.resize(data.len(), 0.0);
            }
            let rendered = &mut scratch[..data.len()];
            render.render(rendered);
            convert_into(rendered, data);
        },
        stream_error(errors),
        None,
    )?;
    Ok(stream)
}

fn convert_into<T: Sample + FromSample<f32>>(rendered: &[f32], data: &mut [T]) {
    for (out, sample) in data.iter_mut().zip(rendered) {
        *out = T::from_sample(*sample);
    }
}

impl DeviceHost for CpalHost {
    type Stream = cpal::Stream;

    fn devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let host = self.host()?;
        let default_name = host.default_output_device().as_ref().and_then(device_name);

        let mut devices: Vec<_> = host
            .output_devices()?
            .filter_map(|device| describe(&device, default_name.as_deref()))
            .collect();
        sort_devices(&mut devices);
        Ok(devices)
    }

    fn default_device(&self) -> Result<Option<DeviceDescriptor>> {
        let host = self.host()?;
        Ok(host.default_output_device().and_then(|device| {
            let name = device_name(&device);
            describe(&device, name.as_deref())
        }))
    }

    fn build_stream(
        &self,
        device: &DeviceDescriptor,
        render: RenderHandle,
        errors: Sender<DeviceEvent>,
    ) -> Result<Self::Stream> {
        let cpal_device = self.find(device)?;
        let format = cpal_device.default_output_config()?.sample_format();
        let config = cpal::StreamConfig {
            channels: device.channels,
            sample_rate: device.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };
        debug!(device = %device.name, ?format, "Building output stream");

        if !SUPPORTED_FORMATS.contains(&format) {
            return Err(OutputError::FormatUnsupported(format!(
                "{} uses {:?} samples",
                device.name, format
            )));
        }

        let stream = match format {
            SampleFormat::F64 => build_converted::<f64>(&cpal_device, &config, render, errors)?,
            SampleFormat::I16 => build_converted::<i16>(&cpal_device, &config, render, errors)?,
            SampleFormat::I32 => build_converted::<i32>(&cpal_device, &config, render, errors)?,
            SampleFormat::U16 => build_converted::<u16>(&cpal_device, &config, render, errors)?,
            _ => cpal_device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| render.render(data),
                stream_error(errors),
                None,
            )?,
        };
        // Some backends start streams immediately; the renderer is gated anyway
        if let Err(e) = stream.pause() {
            debug!(device = %device.name, error = %e, "New stream could not be paused");
        }
        Ok(stream)
    }

    fn play(&self, stream: &Self::Stream) -> Result<()> {
        stream.play()?;
        Ok(())
    }

    fn pause(&self, stream: &Self::Stream) -> Result<()> {
        stream.pause()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_devices_get_converted_samples() {
        let rendered = [0.0, 0.5, -0.5, 1.0];

        let mut pcm16 = [7_i16; 4];
        convert_into(&rendered, &mut pcm16);
        assert_eq!(pcm16[0], 0);
        assert!((16_383..=16_384).contains(&pcm16[1]));
        assert!((-16_384..=-16_383).contains(&pcm16[2]));
        assert!(pcm16[3] >= 32_766);

        let mut unsigned = [0_u16; 4];
        convert_into(&rendered, &mut unsigned);
        assert_eq!(unsigned[0], 32_768);
        assert!(unsigned[1] > unsigned[0] && unsigned[2] < unsigned[0]);

        let mut wide = [0.0_f64; 4];
        convert_into(&rendered, &mut wide);
        assert_eq!(wide, [0.0, 0.5, -0.5, 1.0]);
    }

    #[test]
    fn common_native_formats_are_supported() {
        for format in [SampleFormat::F32, SampleFormat::I16, SampleFormat::I32] {
            assert!(SUPPORTED_FORMATS.contains(&format));
        }
        assert!(!SUPPORTED_FORMATS.contains(&SampleFormat::U8));
    }

    #[test]
    fn default_device_is_listed_first() {
        let host = CpalHost::new();
        let Ok(devices) = host.devices() else {
            eprintln!("No audio host available, skipping");
            return;
        };
        if let Some(first) = devices.first() {
            let any_default = devices.iter().any(|d| d.is_default);
            assert_eq!(first.is_default, any_default);
        }
        for device in &devices {
            assert!(device.sample_rate > 0, "{device}");
            assert!(device.channels > 0, "{device}");
        }
    }
}
