//! Renderable detections.
//!
use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel space, anchored at its top-left corner.
///
/// Width and height are signed. A box whose source corners were inverted keeps
/// its negative extent; consumers that draw it decide how to normalize it.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Corners `(x_min, y_min, x_max, y_max)` regardless of the sign of the extent.
    pub fn corners(&self) -> (f32, f32, f32, f32) {
        let (x0, x1) = (self.x, self.x + self.width);
        let (y0, y1) = (self.y, self.y + self.height);
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

/// A labeled detection, ready for rendering or serialization.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub class_id: i64,
    pub label: String,
    /// Confidence rounded to 4 decimal digits.
    pub score: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    /// Score with exactly four decimals, e.g. `"0.9000"`.
    pub fn score_text(&self) -> String {
        format!("{:.4}", self.score)
    }

    /// Caption drawn next to the box, e.g. `"person 90.00%"`.
    pub fn display_text(&self) -> String {
        format!("{} {:.2}%", self.label, self.score * 100.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn person() -> Detection {
        Detection {
            class_id: 1,
            label: "person".into(),
            score: 0.9,
            bbox: BoundingBox {
                x: 40.0,
                y: 10.0,
                width: 80.0,
                height: 40.0,
            },
        }
    }

    #[test]
    fn test_texts() {
        let detection = person();
        assert_eq!(detection.score_text(), "0.9000");
        assert_eq!(detection.display_text(), "person 90.00%");
    }

    #[test]
    fn test_json_field_names() -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(person())?;
        assert_eq!(value["classId"], 1);
        assert_eq!(value["label"], "person");
        assert_eq!(value["bbox"]["width"], 80.0);
        Ok(())
    }

    #[test]
    fn test_inverted_corners() {
        let bbox = BoundingBox {
            x: 50.0,
            y: 20.0,
            width: -30.0,
            height: -10.0,
        };
        assert_eq!(bbox.corners(), (20.0, 10.0, 50.0, 20.0));
    }
}
