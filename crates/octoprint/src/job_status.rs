//! Job status normalizer.
//!
//! Owns the session's [`JobStatus`]. A new active file resets the record
//! before any field of the frame is applied, so a snapshot never mixes
//! values from two files. Fields missing from a frame are left unchanged.

use std::sync::Arc;

use octosync_core::clock::Clock;
use octosync_core::config::SyncConfig;
use octosync_core::conversions::{end_clock_time, filament_weight_grams, strip_known_extension};
use octosync_core::job::{DisplayDuration, JobStatus, LayerHeight};

use crate::messages::{CurrentData, FileData, JobData, LayerProgressData};

pub struct JobStatusNormalizer {
    status: JobStatus,
    layer_progress_enabled: bool,
    filament_diameter_mm: f64,
    filament_density: f64,
    clock: Arc<dyn Clock>,
}

impl JobStatusNormalizer {
    pub fn new(config: &SyncConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            status: JobStatus::initial(config.layer_progress_enabled),
            layer_progress_enabled: config.layer_progress_enabled,
            filament_diameter_mm: config.filament_diameter_mm,
            filament_density: config.filament_density,
            clock,
        }
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    pub fn reset(&mut self) -> JobStatus {
        self.status = JobStatus::initial(self.layer_progress_enabled);
        self.status.clone()
    }

    /// Apply the job, progress and Z fields of a `current` frame.
    pub fn apply_current(&mut self, data: &CurrentData) -> JobStatus {
        if let Some(file) = data.job.as_ref().and_then(|job| job.file.as_ref()) {
            self.apply_file(file);
        }

        if let Some(progress) = &data.progress {
            if let Some(completion) = progress.completion {
                self.status.progress_percent = completion.round().clamp(0.0, 100.0) as u8;
            }
            if let Some(print_time) = progress.print_time {
                self.status.elapsed_time = DisplayDuration::from_seconds(print_time);
            }
        }

        if let Some(job) = &data.job {
            self.apply_filament(job);
        }

        if let Some(time_left) = data.progress.as_ref().and_then(|p| p.print_time_left) {
            self.status.remaining_time = DisplayDuration::from_seconds(time_left);
            self.status.estimated_end_clock_time =
                Some(end_clock_time(self.clock.now(), time_left));
        }

        if let Some(estimated) = data.job.as_ref().and_then(|job| job.estimated_print_time) {
            self.status.estimated_total_time = DisplayDuration::from_seconds(estimated);
        }

        // With layer progress enabled the plugin owns this field.
        if !self.layer_progress_enabled {
            if let Some(z) = data.current_z {
                self.status.layer_height = LayerHeight::Current(z);
            }
        }

        self.status.clone()
    }

    /// Apply layer counters reported by the layer-progress plugin.
    pub fn apply_layer_progress(&mut self, data: &LayerProgressData) -> JobStatus {
        let (current, total) = match self.status.layer_height {
            LayerHeight::Layers { current, total } => (current, total),
            LayerHeight::Current(_) => (0, 0),
        };
        self.status.layer_height = LayerHeight::Layers {
            current: data.current_layer().unwrap_or(current),
            total: data.total_layer().unwrap_or(total),
        };
        self.status.clone()
    }

    fn apply_file(&mut self, file: &FileData) {
        let display_name = file
            .display
            .as_deref()
            .or(file.name.as_deref())
            .map(strip_known_extension)
            .unwrap_or_default();

        if display_name != self.status.file_name {
            tracing::debug!(
                previous = %self.status.file_name,
                current = %display_name,
                "Active file changed, resetting job status",
            );
            self.status = JobStatus::initial(self.layer_progress_enabled);
            self.status.file_name = display_name.to_string();
        }

        if let (Some(origin), Some(path)) = (&file.origin, &file.path) {
            self.status.full_path = format!("/{origin}/{path}");
        }
    }

    fn apply_filament(&mut self, job: &JobData) {
        let Some(tools) = &job.filament else {
            return;
        };
        let lengths: Vec<f64> = tools
            .values()
            .flatten()
            .filter_map(|usage| usage.length)
            .collect();
        if lengths.is_empty() {
            return;
        }

        let total_length: f64 = lengths.iter().sum();
        self.status.filament_weight =
            filament_weight_grams(total_length, self.filament_diameter_mm, self.filament_density);
    }
}
