use crate::{
    config::ModelConfig,
    detection::{BoundingBox, ColorLabel, Detection},
    labels::load_color_labels,
    model_service::{ModelError, ModelService},
};
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array, ArrayView2, ArrayViewD, Axis, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const INPUT_SIZE: u32 = 640;
const OUTPUT_NAME: &str = "output0";

/// Resizes to the square network input and lays the pixels out as NCHW in [0, 1].
fn transform_frame(frame: &RgbImage) -> Result<Array<f32, Ix4>, ModelError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(ModelError::Transform("empty frame".to_string()));
    }

    let img = image::imageops::resize(frame, INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom);

    let size = INPUT_SIZE as usize;
    let mut input = Array::zeros((1, 3, size, size));
    for (x, y, pixel) in img.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        let [r, g, b] = pixel.0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    Ok(input)
}

/// Decodes a YOLOv8 head laid out as `[4 + classes, anchors]` into boxes in
/// source-image coordinates, then applies non-maximum suppression.
pub fn decode_output(
    output: ArrayView2<f32>,
    img_width: u32,
    img_height: u32,
    min_probability: f32,
    iou_threshold: f32,
) -> Vec<BoundingBox> {
    let scale_x = img_width as f32 / INPUT_SIZE as f32;
    let scale_y = img_height as f32 / INPUT_SIZE as f32;

    let mut boxes = Vec::new();
    for row in output.t().axis_iter(Axis(0)) {
        if row.len() <= 4 {
            continue;
        }
        let best = row
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .reduce(|accum, candidate| if candidate.1 > accum.1 { candidate } else { accum });
        let Some((class_id, prob)) = best else {
            continue;
        };

        if prob < min_probability {
            continue;
        }

        let xc = row[0] * scale_x;
        let yc = row[1] * scale_y;
        let w = row[2] * scale_x;
        let h = row[3] * scale_y;

        boxes.push(BoundingBox {
            class_id: class_id as u32,
            confidence: prob,
            x1: xc - w / 2.,
            y1: yc - h / 2.,
            x2: xc + w / 2.,
            y2: yc + h / 2.,
        });
    }

    non_max_suppression(boxes, iou_threshold)
}

fn non_max_suppression(mut boxes: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|box1, box2| box2.confidence.total_cmp(&box1.confidence));

    let mut result = Vec::new();
    while let Some((&best, rest)) = boxes.split_first() {
        result.push(best);
        boxes = rest
            .iter()
            .filter(|candidate| best.iou(candidate) < iou_threshold)
            .copied()
            .collect();
    }
    result
}

pub struct OrtModelService {
    sessions: Vec<Mutex<Session>>,
    counter: AtomicUsize,
    class_labels: Vec<ColorLabel>,
    min_probability: f32,
    iou_threshold: f32,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ModelError> {
        let class_labels = load_color_labels(&model_config.get_labels_path())?;

        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_path())?;
                Ok(Mutex::new(session))
            })
            .collect::<Result<Vec<_>, ort::Error>>()
            .map_err(|e| ModelError::Load(e.to_string()))?;

        tracing::info!(
            "Created {} ONNX sessions with {} class labels",
            num_instances,
            class_labels.len()
        );

        Ok(Self {
            sessions,
            counter: AtomicUsize::new(0),
            class_labels,
            min_probability: model_config.min_probability,
            iou_threshold: model_config.iou_threshold,
        })
    }

    fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ndarray::ArrayD<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[index].lock();

        tracing::debug!("Handling frame with session {}", index);
        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| ModelError::Inference(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let (shape, data) = outputs[OUTPUT_NAME]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Output(format!("failed to extract tensor: {}", e)))?;

        let array = ndarray::ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec())
            .map_err(|e| ModelError::Output(format!("invalid tensor shape: {}", e)))?;

        Ok(array)
    }
}

fn first_batch(outputs: &ndarray::ArrayD<f32>) -> Result<ArrayView2<'_, f32>, ModelError> {
    let view: ArrayViewD<f32> = outputs.view();
    if view.ndim() != 3 || view.shape()[0] == 0 {
        return Err(ModelError::Output(format!(
            "expected [1, features, anchors], got {:?}",
            view.shape()
        )));
    }
    view.index_axis_move(Axis(0), 0)
        .into_dimensionality()
        .map_err(|e| ModelError::Output(e.to_string()))
}

impl ModelService for OrtModelService {
    fn predict(&self, frame: &RgbImage) -> Result<Vec<Detection>, ModelError> {
        let input = transform_frame(frame)?;
        let outputs = self.run_inference(&input)?;
        let head = first_batch(&outputs)?;

        let boxes = decode_output(
            head,
            frame.width(),
            frame.height(),
            self.min_probability,
            self.iou_threshold,
        );

        Ok(boxes
            .into_iter()
            .map(|bbox| Detection::from_box(bbox, &self.class_labels))
            .collect())
    }

    fn labels(&self) -> &[ColorLabel] {
        &self.class_labels
    }
}
