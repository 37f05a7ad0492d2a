use serde::Serialize;

use crate::error::InvalidConfiguration;

/// Axis-aligned rectangle in display pixels. Always well formed:
/// `left <= right` and `top <= bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Rect {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Result<Self, InvalidConfiguration> {
        if left > right || top > bottom {
            return Err(InvalidConfiguration::MalformedRect {
                left,
                top,
                right,
                bottom,
            });
        }
        Ok(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    pub fn left(&self) -> i32 {
        self.left
    }

    pub fn top(&self) -> i32 {
        self.top
    }

    pub fn right(&self) -> i32 {
        self.right
    }

    pub fn bottom(&self) -> i32 {
        self.bottom
    }

    pub fn width(&self) -> i64 {
        i64::from(self.right) - i64::from(self.left)
    }

    pub fn height(&self) -> i64 {
        i64::from(self.bottom) - i64::from(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Whether a cluster activity is currently unobscured, and where.
///
/// `visible_area` is only meaningful while `unobscured` is true, but both are
/// always carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActivityPlacementState {
    unobscured: bool,
    visible_area: Rect,
}

impl ActivityPlacementState {
    pub fn create(unobscured: bool, visible_area: Rect) -> Self {
        Self {
            unobscured,
            visible_area,
        }
    }

    pub fn is_unobscured(&self) -> bool {
        self.unobscured
    }

    pub fn visible_area(&self) -> Rect {
        self.visible_area
    }

    /// The visible area if the activity is unobscured.
    pub fn unobscured_area(&self) -> Option<Rect> {
        self.unobscured.then_some(self.visible_area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_rejects_inverted_edges() {
        assert!(Rect::new(0, 0, 800, 480).is_ok());
        assert!(Rect::new(10, 10, 10, 10).is_ok());
        assert_eq!(
            Rect::new(20, 0, 10, 480),
            Err(InvalidConfiguration::MalformedRect {
                left: 20,
                top: 0,
                right: 10,
                bottom: 480,
            })
        );
        assert!(Rect::new(0, 50, 10, 40).is_err());
    }

    #[test]
    fn obscured_state_hides_area() {
        let area = Rect::new(0, 0, 400, 240).expect("rect");
        let visible = ActivityPlacementState::create(true, area);
        let hidden = ActivityPlacementState::create(false, area);
        assert_eq!(visible.unobscured_area(), Some(area));
        assert_eq!(hidden.unobscured_area(), None);
        assert_eq!(hidden.visible_area(), area);
    }

    #[test]
    fn rect_dimensions_do_not_overflow() {
        let rect = Rect::new(i32::MIN, 0, i32::MAX, 1).expect("rect");
        assert_eq!(rect.width(), u32::MAX as i64);
        assert!(!rect.is_empty());
    }
}
