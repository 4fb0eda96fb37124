// THEORY (single-pixel colour arithmetic):
// Everything in this module looks at exactly one pixel. Neighbourhood work (blur)
// and frame-wide work (masks, ratios) live in the modules above it.
//
// Two conversions are needed by the fume pipeline:
// - Luma: Rec. 601 weighting of R, G and B, used to turn colour frames into the
//   grayscale frames the background subtractor differences. Computed in 14-bit
//   fixed point so the result is identical on every platform.
// - HSV: the hue/saturation/value triple the colour classifier segments on. The
//   8-bit convention is used throughout:
//   • hue        0..180  (degrees halved so a full turn fits in a byte)
//   • saturation 0..255  (chroma relative to value)
//   • value      0..255  (the brightest channel)
//
// Hue wraps: a reddish pixel just below a full turn rounds up to 180, which is
// folded back to 0. Bands that want to catch red on both sides of the wrap need
// two ranges (see `hue_band`).

pub mod pixel {
    pub type Channel = u8;
    pub type Luma = u8;
    pub type HueDegrees = f32;

    /// Hue units per full turn in the 8-bit HSV convention.
    pub const HUE_RANGE: f32 = 180.0;

    const LUMA_SHIFT: u32 = 14;
    const LUMA_RED: u32 = 4899;
    const LUMA_GREEN: u32 = 9617;
    const LUMA_BLUE: u32 = 1868;

    /// Rec. 601 luma (0.299 R + 0.587 G + 0.114 B), rounded to the nearest byte.
    #[inline]
    pub fn luma(red: Channel, green: Channel, blue: Channel) -> Luma {
        let weighted =
            LUMA_RED * red as u32 + LUMA_GREEN * green as u32 + LUMA_BLUE * blue as u32;
        ((weighted + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT) as Luma
    }

    /// A pixel expressed in 8-bit hue/saturation/value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HsvPixel {
        /// Hue in half-degrees (0..180).
        pub hue: Channel,
        /// Saturation (0..255); zero for any gray.
        pub saturation: Channel,
        /// Value (0..255): the maximum of R, G and B.
        pub value: Channel,
    }

    impl HsvPixel {
        pub fn new(hue: Channel, saturation: Channel, value: Channel) -> Self {
            Self {
                hue,
                saturation,
                value,
            }
        }

        pub fn from_rgb(red: Channel, green: Channel, blue: Channel) -> Self {
            let maximum_channel = red.max(green.max(blue));
            let minimum_channel = red.min(green.min(blue));

            if maximum_channel == 0 {
                return Self::default();
            }

            let chroma = (maximum_channel - minimum_channel) as f32;
            let saturation = (chroma * 255.0 / maximum_channel as f32).round() as Channel;
            let hue = hue_degrees(red, green, blue, maximum_channel, chroma);

            let mut scaled_hue = (hue * HUE_RANGE / 360.0).round();
            if scaled_hue >= HUE_RANGE {
                scaled_hue -= HUE_RANGE;
            }

            Self {
                hue: scaled_hue as Channel,
                saturation,
                value: maximum_channel,
            }
        }
    }

    impl From<&image::Rgb<u8>> for HsvPixel {
        fn from(rgb: &image::Rgb<u8>) -> Self {
            let [red, green, blue] = rgb.0;
            HsvPixel::from_rgb(red, green, blue)
        }
    }

    /// Hue angle in degrees [0, 360); zero for achromatic pixels.
    fn hue_degrees(
        red: Channel,
        green: Channel,
        blue: Channel,
        maximum_channel: Channel,
        chroma: f32,
    ) -> HueDegrees {
        if chroma <= 0.0 {
            return 0.0;
        }

        let (red, green, blue) = (red as f32, green as f32, blue as f32);
        let inverse_chroma = 1.0 / chroma;

        let (base_difference, sector_offset) = if maximum_channel as f32 == red {
            (green - blue, 0.0)
        } else if maximum_channel as f32 == green {
            (blue - red, 2.0)
        } else {
            (red - green, 4.0)
        };

        let mut hue_degrees = (base_difference * inverse_chroma + sector_offset) * 60.0;
        if hue_degrees < 0.0 {
            hue_degrees += 360.0;
        }
        hue_degrees
    }
}

#[cfg(test)]
mod tests {
    use super::pixel::*;

    #[test]
    fn luma_of_primaries() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn luma_of_gray_is_identity() {
        for level in [1u8, 17, 100, 128, 254] {
            assert_eq!(luma(level, level, level), level);
        }
    }

    #[test]
    fn hsv_of_primaries() {
        assert_eq!(HsvPixel::from_rgb(255, 0, 0), HsvPixel::new(0, 255, 255));
        assert_eq!(HsvPixel::from_rgb(0, 255, 0), HsvPixel::new(60, 255, 255));
        assert_eq!(HsvPixel::from_rgb(0, 0, 255), HsvPixel::new(120, 255, 255));
    }

    #[test]
    fn hsv_of_orange() {
        let orange = HsvPixel::from_rgb(255, 128, 0);
        assert_eq!(orange.hue, 15);
        assert_eq!(orange.saturation, 255);
        assert_eq!(orange.value, 255);
    }

    #[test]
    fn grays_have_no_saturation() {
        let gray = HsvPixel::from_rgb(90, 90, 90);
        assert_eq!(gray, HsvPixel::new(0, 0, 90));
        assert_eq!(HsvPixel::from_rgb(0, 0, 0), HsvPixel::default());
    }

    #[test]
    fn hue_just_below_a_full_turn_wraps_to_zero() {
        // 359.8 degrees rounds to 180 half-degrees, which is the same hue as 0.
        let almost_red = HsvPixel::from_rgb(255, 0, 1);
        assert_eq!(almost_red.hue, 0);
    }

    #[test]
    fn from_rgb_pixel_matches_channels() {
        let rgb = image::Rgb([200u8, 40, 180]);
        assert_eq!(HsvPixel::from(&rgb), HsvPixel::from_rgb(200, 40, 180));
    }
}
