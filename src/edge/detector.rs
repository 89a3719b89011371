use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::traits::Detector;

const SIMULATED_CLASSES: &[&str] = &["person", "car", "truck"];

/// A camera frame, described by its size only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    /// 0..=1
    pub confidence: f64,
    /// `[x, y, width, height]`
    pub bbox: [f64; 4],
}

/// Detector that reports something with a fixed probability per frame
pub struct SimulatedDetector {
    rng: StdRng,
    probability: f64,
    confidence_threshold: f64,
}

impl SimulatedDetector {
    pub fn new(probability: f64, confidence_threshold: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            rng,
            probability: probability.clamp(0.0, 1.0),
            confidence_threshold,
        }
    }
}

impl Detector for SimulatedDetector {
    fn detect(&mut self, frame: &Frame) -> Vec<Detection> {
        if !self.rng.random_bool(self.probability) {
            return Vec::new();
        }

        let class_name = SIMULATED_CLASSES[self.rng.random_range(0..SIMULATED_CLASSES.len())];
        let confidence = self.rng.random_range(0.6..=0.95);
        let bbox = [
            self.rng.random_range(0..=frame.width / 2) as f64,
            self.rng.random_range(0..=frame.height / 2) as f64,
            self.rng.random_range(50..=200) as f64,
            self.rng.random_range(50..=200) as f64,
        ];

        let detection = Detection {
            class_name: class_name.to_string(),
            confidence,
            bbox,
        };
        if detection.confidence > self.confidence_threshold {
            vec![detection]
        } else {
            Vec::new()
        }
    }
}
