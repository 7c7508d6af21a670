//! Rolling processing-time statistics

use crate::processing::BoundedWindow;

#[derive(Debug, Clone)]
pub struct ProcessingStats {
    processing_ms: BoundedWindow<f64>,
    preprocessing_ms: BoundedWindow<f64>,
}

impl ProcessingStats {
    pub fn new(samples: usize) -> Self {
        Self {
            processing_ms: BoundedWindow::new(samples),
            preprocessing_ms: BoundedWindow::new(samples),
        }
    }

    pub fn record(&mut self, processing_ms: f64, preprocessing_ms: f64) {
        self.processing_ms.push(processing_ms);
        self.preprocessing_ms.push(preprocessing_ms);
    }

    pub fn avg_processing_ms(&self) -> f64 {
        self.processing_ms.mean()
    }

    pub fn avg_preprocessing_ms(&self) -> f64 {
        self.preprocessing_ms.mean()
    }

    pub fn samples(&self) -> usize {
        self.processing_ms.len()
    }

    pub fn clear(&mut self) {
        self.processing_ms.clear();
        self.preprocessing_ms.clear();
    }
}
