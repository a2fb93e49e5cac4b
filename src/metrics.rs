//! Prometheus metrics for the sync engine: a `Registry` wrapped in a
//! typed collector, exposed through a text-exposition handler, covering
//! all six directions.

use axum::{extract::State, response::IntoResponse};
use prometheus::{Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

use crate::models::{Direction, IdentificationMethod};

const DIRECTION_LABELS: &[&str] = &[
    "tg_to_yt", "yt_to_tg", "tg_to_sp", "sp_to_tg", "yt_to_sp", "sp_to_yt",
];

#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,

    sync_cycles_total: CounterVec,
    tracks_discovered_total: CounterVec,
    tracks_synced_total: CounterVec,
    duplicates_skipped_total: CounterVec,
    sync_errors_total: CounterVec,
    identification_total: CounterVec,
    yt_search_total: Counter,
    sp_search_total: Counter,
    yt_download_total: Counter,
    tg_upload_total: Counter,
    tg_download_total: Counter,

    tracks_total: Gauge,
    tracks_pending: GaugeVec,
    tracks_failed: GaugeVec,
    tracks_synced_current: GaugeVec,
    tracks_duplicate: GaugeVec,
    last_sync_timestamp: GaugeVec,
    last_sync_duration: GaugeVec,
    last_sync_processed: GaugeVec,
    uptime_seconds: Gauge,
    success_rate: Gauge,

    sync_cycle_duration: HistogramVec,
    track_sync_duration: HistogramVec,
    yt_search_duration: prometheus::Histogram,
    sp_search_duration: prometheus::Histogram,
}

impl MetricsCollector {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let sync_cycles_total = CounterVec::new(
            Opts::new("cycles_total", "Total number of scheduler cycles run")
                .namespace("navaar")
                .subsystem("sync"),
            &["direction"],
        )?;

        let tracks_discovered_total = CounterVec::new(
            Opts::new(
                "tracks_discovered_total",
                "Total number of tracks discovered for sync",
            )
            .namespace("navaar")
            .subsystem("sync"),
            &["direction"],
        )?;

        let tracks_synced_total = CounterVec::new(
            Opts::new("tracks_synced_total", "Total number of tracks synced")
                .namespace("navaar")
                .subsystem("sync"),
            &["direction"],
        )?;

        let duplicates_skipped_total = CounterVec::new(
            Opts::new(
                "duplicates_skipped_total",
                "Total number of duplicate tracks skipped",
            )
            .namespace("navaar")
            .subsystem("sync"),
            &["direction"],
        )?;

        let sync_errors_total = CounterVec::new(
            Opts::new("sync_errors_total", "Total number of sync errors")
                .namespace("navaar")
                .subsystem("sync"),
            &["direction", "error_type"],
        )?;

        let identification_total = CounterVec::new(
            Opts::new(
                "identification_total",
                "Total number of tracks identified, by method",
            )
            .namespace("navaar")
            .subsystem("identify"),
            &["method"],
        )?;

        let yt_search_total = Counter::new(
            "navaar_yt_search_total",
            "Total number of YouTube Music search calls",
        )?;

        let sp_search_total = Counter::new(
            "navaar_sp_search_total",
            "Total number of Spotify search calls",
        )?;

        let yt_download_total = Counter::new(
            "navaar_yt_download_total",
            "Total number of audio downloads from YouTube",
        )?;

        let tg_upload_total = Counter::new(
            "navaar_tg_upload_total",
            "Total number of audio uploads to Telegram",
        )?;

        let tg_download_total = Counter::new(
            "navaar_tg_download_total",
            "Total number of audio downloads from Telegram",
        )?;

        let tracks_total = Gauge::new("navaar_tracks_total", "Total number of tracks in the catalog")?;

        let tracks_pending = GaugeVec::new(
            Opts::new("navaar_tracks_pending", "Tracks awaiting pickup, by direction"),
            &["direction"],
        )?;

        let tracks_failed = GaugeVec::new(
            Opts::new("navaar_tracks_failed", "Tracks in the failed state, by direction"),
            &["direction"],
        )?;

        let tracks_synced_current = GaugeVec::new(
            Opts::new("navaar_tracks_synced", "Tracks in the synced state, by direction"),
            &["direction"],
        )?;

        let tracks_duplicate = GaugeVec::new(
            Opts::new("navaar_tracks_duplicate", "Tracks in the duplicate state, by direction"),
            &["direction"],
        )?;

        let last_sync_timestamp = GaugeVec::new(
            Opts::new("navaar_last_sync_timestamp", "Unix timestamp of the last completed cycle"),
            &["direction"],
        )?;

        let last_sync_duration = GaugeVec::new(
            Opts::new("navaar_last_sync_duration_seconds", "Duration of the last completed cycle"),
            &["direction"],
        )?;

        let last_sync_processed = GaugeVec::new(
            Opts::new("navaar_last_sync_processed", "Tracks processed in the last completed cycle"),
            &["direction"],
        )?;

        let up = Gauge::new("navaar_up", "Whether the process is running (always 1 while alive)")?;
        let uptime_seconds = Gauge::new("navaar_uptime_seconds", "Process uptime in seconds")?;
        let success_rate = Gauge::new("navaar_success_rate_percent", "Overall synced/total percentage")?;

        let sync_cycle_duration = HistogramVec::new(
            HistogramOpts::new("navaar_sync_cycle_duration_seconds", "Scheduler cycle duration")
                .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            &["direction"],
        )?;

        let track_sync_duration = HistogramVec::new(
            HistogramOpts::new(
                "navaar_track_sync_duration_seconds",
                "Per-track time from pickup to terminal state",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["direction"],
        )?;

        let yt_search_duration = prometheus::Histogram::with_opts(HistogramOpts::new(
            "navaar_yt_search_duration_seconds",
            "YouTube Music search call latency",
        ))?;

        let sp_search_duration = prometheus::Histogram::with_opts(HistogramOpts::new(
            "navaar_sp_search_duration_seconds",
            "Spotify search call latency",
        ))?;

        registry.register(Box::new(sync_cycles_total.clone()))?;
        registry.register(Box::new(tracks_discovered_total.clone()))?;
        registry.register(Box::new(tracks_synced_total.clone()))?;
        registry.register(Box::new(duplicates_skipped_total.clone()))?;
        registry.register(Box::new(sync_errors_total.clone()))?;
        registry.register(Box::new(identification_total.clone()))?;
        registry.register(Box::new(yt_search_total.clone()))?;
        registry.register(Box::new(sp_search_total.clone()))?;
        registry.register(Box::new(yt_download_total.clone()))?;
        registry.register(Box::new(tg_upload_total.clone()))?;
        registry.register(Box::new(tg_download_total.clone()))?;
        registry.register(Box::new(tracks_total.clone()))?;
        registry.register(Box::new(tracks_pending.clone()))?;
        registry.register(Box::new(tracks_failed.clone()))?;
        registry.register(Box::new(tracks_synced_current.clone()))?;
        registry.register(Box::new(tracks_duplicate.clone()))?;
        registry.register(Box::new(last_sync_timestamp.clone()))?;
        registry.register(Box::new(last_sync_duration.clone()))?;
        registry.register(Box::new(last_sync_processed.clone()))?;
        registry.register(Box::new(up.clone()))?;
        registry.register(Box::new(uptime_seconds.clone()))?;
        registry.register(Box::new(success_rate.clone()))?;
        registry.register(Box::new(sync_cycle_duration.clone()))?;
        registry.register(Box::new(track_sync_duration.clone()))?;
        registry.register(Box::new(yt_search_duration.clone()))?;
        registry.register(Box::new(sp_search_duration.clone()))?;

        up.set(1.0);
        for direction in DIRECTION_LABELS {
            tracks_pending.with_label_values(&[direction]).set(0.0);
            tracks_failed.with_label_values(&[direction]).set(0.0);
            tracks_synced_current.with_label_values(&[direction]).set(0.0);
            tracks_duplicate.with_label_values(&[direction]).set(0.0);
        }

        Ok(Self {
            registry,
            sync_cycles_total,
            tracks_discovered_total,
            tracks_synced_total,
            duplicates_skipped_total,
            sync_errors_total,
            identification_total,
            yt_search_total,
            sp_search_total,
            yt_download_total,
            tg_upload_total,
            tg_download_total,
            tracks_total,
            tracks_pending,
            tracks_failed,
            tracks_synced_current,
            tracks_duplicate,
            last_sync_timestamp,
            last_sync_duration,
            last_sync_processed,
            uptime_seconds,
            success_rate,
            sync_cycle_duration,
            track_sync_duration,
            yt_search_duration,
            sp_search_duration,
        })
    }

    pub fn record_cycle(&self, direction: Direction, processed: usize, duration: Duration) {
        let label = direction.as_str();
        self.sync_cycles_total.with_label_values(&[label]).inc();
        self.sync_cycle_duration
            .with_label_values(&[label])
            .observe(duration.as_secs_f64());
        self.last_sync_duration
            .with_label_values(&[label])
            .set(duration.as_secs_f64());
        self.last_sync_processed
            .with_label_values(&[label])
            .set(processed as f64);
        self.last_sync_timestamp
            .with_label_values(&[label])
            .set(chrono::Utc::now().timestamp() as f64);
    }

    pub fn record_discovered(&self, direction: Direction) {
        self.tracks_discovered_total
            .with_label_values(&[direction.as_str()])
            .inc();
    }

    pub fn record_synced(&self, direction: Direction, sync_duration: Duration) {
        self.tracks_synced_total
            .with_label_values(&[direction.as_str()])
            .inc();
        self.track_sync_duration
            .with_label_values(&[direction.as_str()])
            .observe(sync_duration.as_secs_f64());
    }

    pub fn record_duplicate(&self, direction: Direction) {
        self.duplicates_skipped_total
            .with_label_values(&[direction.as_str()])
            .inc();
    }

    pub fn record_error(&self, direction: Direction, error_type: &str) {
        self.sync_errors_total
            .with_label_values(&[direction.as_str(), error_type])
            .inc();
    }

    pub fn record_identification(&self, method: IdentificationMethod) {
        self.identification_total
            .with_label_values(&[method.as_str()])
            .inc();
    }

    pub fn record_yt_search(&self, duration: Duration) {
        self.yt_search_total.inc();
        self.yt_search_duration.observe(duration.as_secs_f64());
    }

    pub fn record_sp_search(&self, duration: Duration) {
        self.sp_search_total.inc();
        self.sp_search_duration.observe(duration.as_secs_f64());
    }

    pub fn record_yt_download(&self) {
        self.yt_download_total.inc();
    }

    pub fn record_tg_upload(&self) {
        self.tg_upload_total.inc();
    }

    pub fn record_tg_download(&self) {
        self.tg_download_total.inc();
    }

    /// Refreshes the gauges that summarize the whole catalog from
    /// `get_counts`/`get_stats`, called periodically by the scheduler.
    pub fn refresh_catalog_gauges(
        &self,
        counts: &crate::db::DirectionStatusCounts,
        stats: &crate::db::TrackStats,
        uptime: Duration,
    ) {
        self.tracks_total.set(stats.total as f64);
        self.success_rate.set(stats.success_rate);
        self.uptime_seconds.set(uptime.as_secs_f64());

        for direction in DIRECTION_LABELS {
            let by_status = counts.get(*direction);
            let get = |status: &str| by_status.and_then(|m| m.get(status)).copied().unwrap_or(0) as f64;
            self.tracks_pending
                .with_label_values(&[direction])
                .set(get("pending") + get("retry_scheduled"));
            self.tracks_failed.with_label_values(&[direction]).set(get("failed"));
            self.tracks_synced_current
                .with_label_values(&[direction])
                .set(get("synced"));
            self.tracks_duplicate
                .with_label_values(&[direction])
                .set(get("duplicate"));
        }
    }

    pub fn get_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

/// Text-exposition handler mounted at `/metrics`.
pub async fn metrics_handler(State(metrics): State<Arc<MetricsCollector>>) -> impl IntoResponse {
    match metrics.get_metrics() {
        Ok(body) => (
            axum::http::StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(err) => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; version=0.0.4")],
            format!("failed to encode metrics: {err}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_registers_without_panicking() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_cycle(Direction::TgToYt, 3, Duration::from_millis(500));
        collector.record_synced(Direction::TgToYt, Duration::from_secs(2));
        assert!(collector.get_metrics().unwrap().contains("navaar_sync_cycles_total"));
    }
}
