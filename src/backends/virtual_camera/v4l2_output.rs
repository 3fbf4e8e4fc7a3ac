// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 video-output device access for v4l2loopback
//!
//! Only two ioctls are needed: `VIDIOC_QUERYCAP` for probing and
//! `VIDIOC_S_FMT` to negotiate the YUYV output format. Frames are then
//! pushed with plain `write(2)` calls on a write-only descriptor.
//!
//! Device access sits behind [`DeviceOpener`]/[`OutputDevice`] so the sink's
//! state machine can be driven without a kernel module loaded.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use tracing::{debug, info, warn};

// ===== V4L2 Constants =====

const V4L2_BUF_TYPE_VIDEO_OUTPUT: u32 = 2;
const V4L2_FIELD_NONE: u32 = 1;
const V4L2_COLORSPACE_SRGB: u32 = 8;
const V4L2_CAP_VIDEO_OUTPUT: u32 = 0x0000_0002;
const V4L2_CAP_DEVICE_CAPS: u32 = 0x8000_0000;

/// FourCC 'YUYV' (packed 4:2:2)
pub const V4L2_PIX_FMT_YUYV: u32 = fourcc(b"YUYV");

const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | ((code[1] as u32) << 8) | ((code[2] as u32) << 16) | ((code[3] as u32) << 24)
}

// ===== V4L2 ioctl Numbers =====
// (dir << 30) | (size << 16) | ('V' << 8) | nr, dir: 2=READ, 3=READ|WRITE

const fn ioc_readwrite(nr: u32, size: usize) -> libc::c_ulong {
    ((3u32 << 30) | ((size as u32) << 16) | ((b'V' as u32) << 8) | nr) as libc::c_ulong
}

/// Query capabilities (v4l2_capability: 104 bytes)
const VIDIOC_QUERYCAP: libc::c_ulong = 0x8068_5600;
/// Set format; the size depends on pointer width, so it is derived from the struct
const VIDIOC_S_FMT: libc::c_ulong = ioc_readwrite(5, std::mem::size_of::<V4l2Format>());

// ===== V4L2 ioctl Structures =====

#[repr(C)]
struct V4l2Capability {
    driver: [u8; 16],
    card: [u8; 32],
    bus_info: [u8; 32],
    version: u32,
    capabilities: u32,
    device_caps: u32,
    reserved: [u32; 3],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct V4l2PixFormat {
    width: u32,
    height: u32,
    pixelformat: u32,
    field: u32,
    bytesperline: u32,
    sizeimage: u32,
    colorspace: u32,
    priv_: u32,
    flags: u32,
    ycbcr_enc: u32,
    quantization: u32,
    xfer_func: u32,
}

/// `fmt` union of struct v4l2_format; `v4l2_window` holds pointers, hence
/// the pointer-aligned zero-length member
#[repr(C)]
union V4l2FormatData {
    pix: V4l2PixFormat,
    raw_data: [u8; 200],
    _align: [*mut libc::c_void; 0],
}

#[repr(C)]
struct V4l2Format {
    buf_type: u32,
    fmt: V4l2FormatData,
}

/// Geometry and layout negotiated with the output device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub width: u32,
    pub height: u32,
}

impl OutputFormat {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Row stride of the packed YUYV buffer
    pub fn bytes_per_line(&self) -> u32 {
        self.width * 2
    }

    /// Full frame size in bytes
    pub fn size_image(&self) -> u32 {
        self.bytes_per_line() * self.height
    }
}

/// An open video-output device
pub trait OutputDevice {
    /// Negotiate packed YUYV, progressive, at the given geometry
    fn set_format(&mut self, format: &OutputFormat) -> io::Result<()>;

    /// Issue a single write; returns the byte count the kernel accepted
    fn write_frame(&mut self, data: &[u8]) -> io::Result<usize>;
}

/// Opens output devices by path
pub trait DeviceOpener {
    fn open(&mut self, path: &str) -> io::Result<Box<dyn OutputDevice>>;
}

/// v4l2loopback (or any V4L2 output node) opened write-only
#[derive(Debug)]
pub struct V4l2OutputDevice {
    file: File,
}

impl V4l2OutputDevice {
    pub fn open(path: &str) -> io::Result<Self> {
        let file = OpenOptions::new().write(true).open(path)?;

        match query_v4l2_cap(file.as_raw_fd()) {
            Some(cap) => info!(
                path,
                driver = %c_string(&cap.driver),
                card = %c_string(&cap.card),
                "Opened virtual camera device"
            ),
            None => warn!(path, "Opened device does not answer VIDIOC_QUERYCAP"),
        }

        Ok(Self { file })
    }
}

impl OutputDevice for V4l2OutputDevice {
    fn set_format(&mut self, format: &OutputFormat) -> io::Result<()> {
        let pix = V4l2PixFormat {
            width: format.width,
            height: format.height,
            pixelformat: V4L2_PIX_FMT_YUYV,
            field: V4L2_FIELD_NONE,
            bytesperline: format.bytes_per_line(),
            sizeimage: format.size_image(),
            colorspace: V4L2_COLORSPACE_SRGB,
            priv_: 0,
            flags: 0,
            ycbcr_enc: 0,
            quantization: 0,
            xfer_func: 0,
        };

        let mut v4l2_format = V4l2Format {
            buf_type: V4L2_BUF_TYPE_VIDEO_OUTPUT,
            fmt: V4l2FormatData { raw_data: [0; 200] },
        };
        v4l2_format.fmt.pix = pix;

        let result = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                VIDIOC_S_FMT as _,
                &mut v4l2_format as *mut V4l2Format,
            )
        };
        if result < 0 {
            return Err(io::Error::last_os_error());
        }

        debug!(
            width = format.width,
            height = format.height,
            "VIDIOC_S_FMT accepted YUYV output format"
        );
        Ok(())
    }

    fn write_frame(&mut self, data: &[u8]) -> io::Result<usize> {
        self.file.write(data)
    }
}

/// Opens real V4L2 output nodes
#[derive(Debug, Default, Clone, Copy)]
pub struct V4l2Opener;

impl DeviceOpener for V4l2Opener {
    fn open(&mut self, path: &str) -> io::Result<Box<dyn OutputDevice>> {
        Ok(Box::new(V4l2OutputDevice::open(path)?))
    }
}

/// Identity of a V4L2 node as reported by VIDIOC_QUERYCAP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    /// Node accepts frames written to it
    pub video_output: bool,
}

impl DeviceCapabilities {
    /// v4l2loopback reports itself under this driver name
    pub fn is_loopback(&self) -> bool {
        self.driver == "v4l2 loopback"
    }
}

fn c_string(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).to_string()
}

fn query_v4l2_cap(fd: RawFd) -> Option<V4l2Capability> {
    let mut cap: V4l2Capability = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::ioctl(fd, VIDIOC_QUERYCAP as _, &mut cap as *mut V4l2Capability) };
    if result < 0 { None } else { Some(cap) }
}

/// Query driver/card names and output support of a device node
///
/// Returns `None` if the node cannot be opened or is not a V4L2 device.
pub fn query_capabilities(device_path: &str) -> Option<DeviceCapabilities> {
    let file = OpenOptions::new().write(true).open(device_path).ok()?;
    let cap = query_v4l2_cap(file.as_raw_fd())?;

    // Per-node caps are only meaningful when the driver advertises them
    let caps = if cap.capabilities & V4L2_CAP_DEVICE_CAPS != 0 {
        cap.device_caps
    } else {
        cap.capabilities
    };

    let info = DeviceCapabilities {
        driver: c_string(&cap.driver),
        card: c_string(&cap.card),
        bus_info: c_string(&cap.bus_info),
        video_output: caps & V4L2_CAP_VIDEO_OUTPUT != 0,
    };

    debug!(device_path, driver = %info.driver, card = %info.card, "Queried V4L2 capabilities");
    Some(info)
}

/// Find v4l2loopback device nodes
///
/// Scans /dev/video* and checks the driver-reported name via sysfs.
/// Results are sorted by node name.
pub fn find_loopback_devices() -> Vec<String> {
    use std::fs;
    use std::path::Path;

    let Ok(entries) = fs::read_dir(Path::new("/dev")) else {
        return Vec::new();
    };

    let mut video_devices: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("video"))
        .collect();
    video_devices.sort_by_key(|e| e.file_name());

    video_devices
        .into_iter()
        .filter(|entry| {
            let name = entry.file_name();
            let Some(device_num) = name.to_string_lossy().strip_prefix("video").map(str::to_owned)
            else {
                return false;
            };
            let sysfs_name = format!("/sys/class/video4linux/video{}/name", device_num);
            fs::read_to_string(&sysfs_name)
                .map(|device_name| is_loopback_name(device_name.trim()))
                .unwrap_or(false)
        })
        .map(|entry| entry.path().to_string_lossy().to_string())
        .collect()
}

/// v4l2loopback default card names, plus custom names commonly given to it
fn is_loopback_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    name.contains("Dummy video device")
        || lower.contains("loopback")
        || lower.contains("virtual")
        || name.contains("OBS")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_sizes_match_kernel_abi() {
        assert_eq!(std::mem::size_of::<V4l2Capability>(), 104);
        assert_eq!(std::mem::size_of::<V4l2PixFormat>(), 48);
        #[cfg(target_pointer_width = "64")]
        assert_eq!(std::mem::size_of::<V4l2Format>(), 208);
    }

    #[test]
    fn test_ioctl_numbers() {
        #[cfg(target_pointer_width = "64")]
        assert_eq!(VIDIOC_S_FMT, 0xC0D0_5605);
        assert_eq!(VIDIOC_QUERYCAP, 0x8068_5600);
    }

    #[test]
    fn test_yuyv_fourcc() {
        assert_eq!(V4L2_PIX_FMT_YUYV, 0x5659_5559);
    }

    #[test]
    fn test_output_format_layout() {
        let format = OutputFormat::new(1280, 720);
        assert_eq!(format.bytes_per_line(), 2560);
        assert_eq!(format.size_image(), 2560 * 720);
    }

    #[test]
    fn test_loopback_names() {
        assert!(is_loopback_name("Dummy video device (0x0000)"));
        assert!(is_loopback_name("FilterCam Virtual"));
        assert!(is_loopback_name("OBS Virtual Camera"));
        assert!(!is_loopback_name("Integrated Camera: Integrated C"));
    }

    #[test]
    fn test_open_missing_device_fails() {
        assert!(V4l2OutputDevice::open("/nonexistent/video-output").is_err());
        assert!(query_capabilities("/nonexistent/video-output").is_none());
    }
}
