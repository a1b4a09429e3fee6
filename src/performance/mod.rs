//! # Frame timing
//!
//! `PerformanceMonitor` keeps a window of recent frame times and the draw
//! statistics of the last submitted frame. `FrameStats` is the snapshot a
//! debug overlay reads each frame: timing, entity count and pointer position.
//!
//! ## Usage
//!
//! ```rust
//! use umbra::performance::PerformanceMonitor;
//!
//! let mut monitor = PerformanceMonitor::new();
//!
//! // In your main loop
//! monitor.begin_frame();
//! // ... render frame ...
//! monitor.end_frame();
//!
//! println!("{:.1} fps", monitor.get_metrics().fps);
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use cgmath::Vector2;

use crate::gfx::rendering::FrameReport;

/// Aggregated timing and draw metrics.
#[derive(Debug, Clone)]
pub struct PerformanceMetrics {
    /// Current frames per second
    pub fps: f32,
    /// Average frame time in milliseconds
    pub frame_time_ms: f32,
    /// Minimum frame time in the current window
    pub min_frame_time_ms: f32,
    /// Maximum frame time in the current window
    pub max_frame_time_ms: f32,
    /// Shadow depth draws in the last frame
    pub shadow_draw_calls: u32,
    /// Number of draw calls in the last frame
    pub draw_calls: u32,
    /// Number of vertices rendered in the last frame
    pub vertex_count: u32,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            fps: 0.0,
            frame_time_ms: 0.0,
            min_frame_time_ms: f32::MAX,
            max_frame_time_ms: 0.0,
            shadow_draw_calls: 0,
            draw_calls: 0,
            vertex_count: 0,
        }
    }
}

/// Per-frame values exposed to an overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    /// Seconds since the previous frame.
    pub delta_time: f32,
    pub fps: f32,
    pub entity_count: usize,
    pub pointer_position: Vector2<f32>,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self {
            delta_time: 0.0,
            fps: 0.0,
            entity_count: 0,
            pointer_position: Vector2::new(0.0, 0.0),
        }
    }
}

/// Performance monitoring system
#[derive(Debug)]
pub struct PerformanceMonitor {
    /// Ring buffer of recent frame times for averaging
    frame_times: VecDeque<Duration>,
    max_samples: usize,
    frame_start: Option<Instant>,
    current_metrics: PerformanceMetrics,
    last_update: Instant,
    /// Metrics are recomputed at most this often
    update_interval: Duration,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::with_samples(120)
    }

    /// A monitor averaging over the last `max_samples` frames.
    pub fn with_samples(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            frame_times: VecDeque::with_capacity(max_samples),
            max_samples,
            frame_start: None,
            current_metrics: PerformanceMetrics::default(),
            last_update: Instant::now(),
            update_interval: Duration::from_millis(100),
        }
    }

    /// Mark the beginning of a frame
    pub fn begin_frame(&mut self) {
        self.frame_start = Some(Instant::now());
    }

    /// Mark the end of a frame and update metrics
    pub fn end_frame(&mut self) {
        if let Some(start) = self.frame_start.take() {
            self.add_frame_time(start.elapsed());

            if self.last_update.elapsed() >= self.update_interval {
                self.update_metrics();
                self.last_update = Instant::now();
            }
        }
    }

    /// Records a frame time measured elsewhere and refreshes the metrics.
    pub fn record_frame_time(&mut self, frame_time: Duration) {
        self.add_frame_time(frame_time);
        self.update_metrics();
    }

    fn add_frame_time(&mut self, frame_time: Duration) {
        if self.frame_times.len() >= self.max_samples {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(frame_time);
    }

    fn update_metrics(&mut self) {
        if self.frame_times.is_empty() {
            return;
        }

        let total_time: Duration = self.frame_times.iter().sum();
        let avg_frame_time = total_time / self.frame_times.len() as u32;
        let avg_frame_time_ms = avg_frame_time.as_secs_f32() * 1000.0;

        self.current_metrics.frame_time_ms = avg_frame_time_ms;
        self.current_metrics.fps = if avg_frame_time_ms > 0.0 {
            1000.0 / avg_frame_time_ms
        } else {
            0.0
        };

        if let (Some(min_time), Some(max_time)) = (self.frame_times.iter().min(), self.frame_times.iter().max()) {
            self.current_metrics.min_frame_time_ms = min_time.as_secs_f32() * 1000.0;
            self.current_metrics.max_frame_time_ms = max_time.as_secs_f32() * 1000.0;
        }
    }

    /// Copies draw statistics out of the last frame report.
    pub fn update_render_stats(&mut self, report: &FrameReport) {
        self.current_metrics.shadow_draw_calls = report.shadow_draw_calls;
        self.current_metrics.draw_calls = report.draw_calls;
        self.current_metrics.vertex_count = report.vertices;
    }

    pub fn get_metrics(&self) -> &PerformanceMetrics {
        &self.current_metrics
    }

    /// Frame time history in milliseconds, oldest first.
    pub fn get_frame_time_history(&self) -> Vec<f32> {
        self.frame_times
            .iter()
            .map(|duration| duration.as_secs_f32() * 1000.0)
            .collect()
    }

    /// Snapshot for an overlay.
    pub fn frame_stats(&self, delta_time: f32, entity_count: usize, pointer_position: Vector2<f32>) -> FrameStats {
        FrameStats {
            delta_time,
            fps: self.current_metrics.fps,
            entity_count,
            pointer_position,
        }
    }

    /// Reset all metrics and history
    pub fn reset(&mut self) {
        self.frame_times.clear();
        self.current_metrics = PerformanceMetrics::default();
        self.frame_start = None;
        self.last_update = Instant::now();
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_from_average_frame_time() {
        let mut monitor = PerformanceMonitor::new();
        monitor.record_frame_time(Duration::from_millis(10));
        monitor.record_frame_time(Duration::from_millis(30));

        let metrics = monitor.get_metrics();
        assert!((metrics.frame_time_ms - 20.0).abs() < 1e-3);
        assert!((metrics.fps - 50.0).abs() < 1e-2);
        assert!((metrics.min_frame_time_ms - 10.0).abs() < 1e-3);
        assert!((metrics.max_frame_time_ms - 30.0).abs() < 1e-3);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut monitor = PerformanceMonitor::with_samples(3);
        for ms in 1..=5 {
            monitor.record_frame_time(Duration::from_millis(ms));
        }
        let history = monitor.get_frame_time_history();
        assert_eq!(history.len(), 3);
        assert!((history[0] - 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_render_stats_and_frame_stats() {
        let mut monitor = PerformanceMonitor::new();
        monitor.update_render_stats(&FrameReport {
            frame: 7,
            shadow_draw_calls: 3,
            draw_calls: 7,
            vertices: 96,
        });
        assert_eq!(monitor.get_metrics().draw_calls, 7);
        assert_eq!(monitor.get_metrics().shadow_draw_calls, 3);
        assert_eq!(monitor.get_metrics().vertex_count, 96);

        monitor.record_frame_time(Duration::from_millis(16));
        let stats = monitor.frame_stats(0.016, 3, Vector2::new(10.0, 20.0));
        assert_eq!(stats.entity_count, 3);
        assert_eq!(stats.pointer_position, Vector2::new(10.0, 20.0));
        assert!((stats.fps - 62.5).abs() < 0.1);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut monitor = PerformanceMonitor::new();
        monitor.record_frame_time(Duration::from_millis(5));
        monitor.reset();
        assert!(monitor.get_frame_time_history().is_empty());
        assert_eq!(monitor.get_metrics().fps, 0.0);
    }
}
