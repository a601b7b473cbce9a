use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct ColorLabel {
    pub label: String,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// Raw model output for one object, coordinates in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub class_id: u32,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn intersection(&self, other: &BoundingBox) -> f32 {
        let width = self.x2.min(other.x2) - self.x1.max(other.x1);
        let height = self.y2.min(other.y2) - self.y1.max(other.y1);
        width.max(0.0) * height.max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let union = self.area() + other.area() - self.intersection(other);
        if union <= 0.0 {
            return 0.0;
        }
        self.intersection(other) / union
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub class_id: u32,
    pub class_label: String,
    #[serde(skip)]
    pub color: [u8; 3],
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Detection {
    pub fn from_box(bbox: BoundingBox, labels: &[ColorLabel]) -> Self {
        let (class_label, color) = match labels.get(bbox.class_id as usize) {
            Some(color_label) => (
                color_label.label.clone(),
                [color_label.red, color_label.green, color_label.blue],
            ),
            None => (format!("Unknown class {}", bbox.class_id), [0, 0, 0]),
        };

        Self {
            class_id: bbox.class_id,
            class_label,
            color,
            confidence: bbox.confidence,
            x1: bbox.x1,
            y1: bbox.y1,
            x2: bbox.x2,
            y2: bbox.y2,
        }
    }
}
