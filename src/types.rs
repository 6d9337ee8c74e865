use fixed::types::I32F32;

const PT_PER_MM: f32 = 72.0 / 25.4;

/// Fixed-point PDF point (1/72 inch). All layout arithmetic is done in
/// millipoints so repeated cursor advances do not drift.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Pt(I32F32);

impl Pt {
    pub const ZERO: Pt = Pt(I32F32::from_bits(0));

    pub fn from_f32(value: f32) -> Pt {
        if !value.is_finite() {
            return Pt::ZERO;
        }
        let milli = (value as f64 * 1000.0).round();
        let milli = milli.clamp(i64::MIN as f64, i64::MAX as f64) as i64;
        Pt::from_milli_i64(milli)
    }

    pub fn from_mm(mm: f32) -> Pt {
        Pt::from_f32(mm * PT_PER_MM)
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    pub fn to_mm(self) -> f32 {
        self.to_f32() / PT_PER_MM
    }

    pub fn to_milli_i64(self) -> i64 {
        let bits = self.0.to_bits() as i128;
        let denom = 1i128 << 32;
        let scaled = bits * 1000;
        let adj = if scaled >= 0 { denom / 2 } else { -denom / 2 };
        let milli = (scaled + adj) / denom;
        milli.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn from_milli_i64(milli: i64) -> Pt {
        let denom = 1i128 << 32;
        let milli = milli as i128;
        let adj = if milli >= 0 { 500 } else { -500 };
        let bits = (milli * denom + adj) / 1000;
        let bits = bits.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Pt(I32F32::from_bits(bits))
    }

    pub fn max(self, other: Pt) -> Pt {
        if self >= other { self } else { other }
    }

    pub fn mul_ratio(self, num: i32, denom: i32) -> Pt {
        if denom == 0 {
            return Pt::ZERO;
        }
        let milli = self.to_milli_i64() as i128 * num as i128;
        let denom = denom as i128;
        let half = denom.abs() / 2;
        let value = if milli >= 0 {
            (milli + half) / denom
        } else {
            -((-milli + half) / denom)
        };
        Pt::from_milli_i64(value.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }
}

impl std::ops::Add for Pt {
    type Output = Pt;
    fn add(self, rhs: Pt) -> Pt {
        Pt::from_milli_i64(self.to_milli_i64().saturating_add(rhs.to_milli_i64()))
    }
}

impl std::ops::AddAssign for Pt {
    fn add_assign(&mut self, rhs: Pt) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Pt {
    type Output = Pt;
    fn sub(self, rhs: Pt) -> Pt {
        Pt::from_milli_i64(self.to_milli_i64().saturating_sub(rhs.to_milli_i64()))
    }
}

impl std::ops::Mul<i32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: i32) -> Pt {
        Pt::from_milli_i64(self.to_milli_i64().saturating_mul(rhs as i64))
    }
}

impl std::ops::Div<i32> for Pt {
    type Output = Pt;
    fn div(self, rhs: i32) -> Pt {
        self.mul_ratio(1, rhs)
    }
}

impl std::iter::Sum for Pt {
    fn sum<I: Iterator<Item = Pt>>(iter: I) -> Pt {
        iter.fold(Pt::ZERO, |acc, v| acc + v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: Pt,
    pub height: Pt,
}

impl Size {
    pub fn a4() -> Self {
        Self::from_mm(210.0, 297.0)
    }

    pub fn from_mm(width_mm: f32, height_mm: f32) -> Self {
        Self {
            width: Pt::from_mm(width_mm),
            height: Pt::from_mm(height_mm),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: Pt,
    pub y: Pt,
    pub width: Pt,
    pub height: Pt,
}

impl Rect {
    pub fn bottom(&self) -> Pt {
        self.y + self.height
    }

    pub fn right(&self) -> Pt {
        self.x + self.width
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: Pt,
    pub right: Pt,
    pub bottom: Pt,
    pub left: Pt,
}

impl Margins {
    pub fn all_mm(value: f32) -> Self {
        let v = Pt::from_mm(value);
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }

    /// The area inside the margins of a page of `size`.
    pub fn frame(&self, size: Size) -> Rect {
        Rect {
            x: self.left,
            y: self.top,
            width: size.width - self.left - self.right,
            height: size.height - self.top - self.bottom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn gray(level: f32) -> Self {
        Self::rgb(level, level, level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millimetres_round_trip_through_points() {
        let ten = Pt::from_mm(10.0);
        assert!((ten.to_f32() - 28.346).abs() < 0.01);
        assert!((ten.to_mm() - 10.0).abs() < 0.001);
    }

    #[test]
    fn arithmetic_stays_on_millipoint_grid() {
        let step = Pt::from_f32(0.333);
        let total: Pt = (0..3).map(|_| step).sum();
        assert_eq!(total.to_milli_i64(), 999);
        assert_eq!((step * 3).to_milli_i64(), 999);
        assert_eq!(Pt::from_f32(10.0).mul_ratio(556, 1000).to_milli_i64(), 5560);
    }

    #[test]
    fn margins_frame_excludes_all_edges() {
        let frame = Margins::all_mm(10.0).frame(Size::a4());
        assert_eq!(frame.x, Pt::from_mm(10.0));
        assert!((frame.width.to_mm() - 190.0).abs() < 0.01);
        assert!((frame.bottom().to_mm() - 287.0).abs() < 0.01);
    }
}
