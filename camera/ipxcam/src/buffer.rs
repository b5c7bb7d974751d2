use machine_vision_formats as formats;

/// Identifies an announced buffer within its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct BufferId(pub u64);

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// PFNC pixel format codes.
pub mod pfnc {
    pub const MONO8: u32 = 0x0108_0001;
    pub const MONO10: u32 = 0x0110_0003;
    pub const MONO12: u32 = 0x0110_0005;
    pub const MONO16: u32 = 0x0110_0007;
    pub const BAYER_GR8: u32 = 0x0108_0008;
    pub const BAYER_RG8: u32 = 0x0108_0009;
    pub const BAYER_GB8: u32 = 0x0108_000A;
    pub const BAYER_BG8: u32 = 0x0108_000B;
    pub const RGB8: u32 = 0x0218_0014;
    pub const BGR8: u32 = 0x0218_0015;
    pub const YUV422_8_UYVY: u32 = 0x0210_001F;

    /// Bits per pixel encoded in a PFNC code.
    pub const fn bits_per_pixel(code: u32) -> u32 {
        (code >> 16) & 0xFF
    }

    pub fn name(code: u32) -> Option<&'static str> {
        Some(match code {
            MONO8 => "Mono8",
            MONO10 => "Mono10",
            MONO12 => "Mono12",
            MONO16 => "Mono16",
            BAYER_GR8 => "BayerGR8",
            BAYER_RG8 => "BayerRG8",
            BAYER_GB8 => "BayerGB8",
            BAYER_BG8 => "BayerBG8",
            RGB8 => "RGB8",
            BGR8 => "BGR8",
            YUV422_8_UYVY => "YUV422_8_UYVY",
            _ => return None,
        })
    }

    pub fn from_name(name: &str) -> Option<u32> {
        Some(match name {
            "Mono8" => MONO8,
            "Mono10" => MONO10,
            "Mono12" => MONO12,
            "Mono16" => MONO16,
            "BayerGR8" => BAYER_GR8,
            "BayerRG8" => BAYER_RG8,
            "BayerGB8" => BAYER_GB8,
            "BayerBG8" => BAYER_BG8,
            "RGB8" => RGB8,
            "BGR8" => BGR8,
            "YUV422_8_UYVY" => YUV422_8_UYVY,
            _ => return None,
        })
    }

    /// Every code in this module, for enumeration parameters.
    pub const ALL: &[u32] = &[
        MONO8,
        MONO10,
        MONO12,
        MONO16,
        BAYER_GR8,
        BAYER_RG8,
        BAYER_GB8,
        BAYER_BG8,
        RGB8,
        BGR8,
        YUV422_8_UYVY,
    ];
}

/// Map a PFNC code onto [formats::PixFmt] where an equivalent exists.
pub fn pixel_format_code(code: u32) -> Option<formats::PixFmt> {
    use formats::PixFmt::*;
    Some(match code {
        pfnc::MONO8 => Mono8,
        pfnc::BAYER_GR8 => BayerGR8,
        pfnc::BAYER_RG8 => BayerRG8,
        pfnc::BAYER_GB8 => BayerGB8,
        pfnc::BAYER_BG8 => BayerBG8,
        pfnc::RGB8 => RGB8,
        pfnc::YUV422_8_UYVY => YUV422,
        _ => return None,
    })
}

/// Image metadata filled in by the acquisition engine on delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct FrameMeta {
    /// Offset of the first image byte within the buffer memory.
    pub image_offset: usize,
    /// Number of image bytes after `image_offset`.
    pub image_size: usize,
    /// PFNC pixel format code.
    pub pixel_format: u32,
    pub width: u32,
    pub height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub padding_x: u32,
    pub padding_y: u32,
    /// Per stream frame counter. Skips when frames are dropped.
    pub frame_id: u64,
    /// Device clock ticks.
    pub timestamp: u64,
    pub incomplete: bool,
}

/// One frame slot: memory plus the metadata of the frame it last received.
///
/// A `Buffer` value is only ever held by one side. The stream keeps it while
/// it is queued and moves it out on delivery; the client moves it back with
/// [crate::Stream::queue_buffer].
#[derive(Debug)]
pub struct Buffer {
    id: BufferId,
    data: Vec<u8>,
    meta: FrameMeta,
}

impl Buffer {
    pub fn new(id: BufferId, data: Vec<u8>) -> Self {
        Self {
            id,
            data,
            meta: FrameMeta::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Size of the backing memory in bytes.
    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The image bytes, clamped to the backing memory.
    pub fn image(&self) -> &[u8] {
        let start = self.meta.image_offset.min(self.data.len());
        let end = start.saturating_add(self.meta.image_size).min(self.data.len());
        &self.data[start..end]
    }

    #[inline]
    pub fn meta(&self) -> &FrameMeta {
        &self.meta
    }

    #[inline]
    pub fn meta_mut(&mut self) -> &mut FrameMeta {
        &mut self.meta
    }

    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.meta.frame_id
    }

    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.meta.timestamp
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.meta.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.meta.height
    }

    #[inline]
    pub fn is_incomplete(&self) -> bool {
        self.meta.incomplete
    }

    #[inline]
    pub fn pixel_format_code(&self) -> u32 {
        self.meta.pixel_format
    }

    pub fn pix_fmt(&self) -> Option<formats::PixFmt> {
        pixel_format_code(self.meta.pixel_format)
    }

    pub fn bits_per_pixel(&self) -> u32 {
        pfnc::bits_per_pixel(self.meta.pixel_format)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pfnc() {
        assert_eq!(pfnc::bits_per_pixel(pfnc::MONO8), 8);
        assert_eq!(pfnc::bits_per_pixel(pfnc::MONO12), 16);
        assert_eq!(pfnc::bits_per_pixel(pfnc::RGB8), 24);
        for code in pfnc::ALL {
            let name = pfnc::name(*code).unwrap();
            assert_eq!(pfnc::from_name(name), Some(*code));
        }
        assert_eq!(pixel_format_code(pfnc::BAYER_RG8), Some(formats::PixFmt::BayerRG8));
        assert_eq!(pixel_format_code(pfnc::MONO16), None);
    }

    #[test]
    fn test_image_slice_is_clamped() {
        let mut buf = Buffer::new(BufferId(3), vec![7u8; 16]);
        buf.meta_mut().image_offset = 4;
        buf.meta_mut().image_size = 8;
        assert_eq!(buf.image().len(), 8);
        buf.meta_mut().image_size = 100;
        assert_eq!(buf.image().len(), 12);
        buf.meta_mut().image_offset = 100;
        assert!(buf.image().is_empty());
        assert_eq!(buf.buffer_size(), 16);
        assert_eq!(buf.id().to_string(), "#3");
    }
}
