use crate::error::AppResult;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::path::{Path, PathBuf};
use sysinfo::{Disks, ProcessesToUpdate, System};

pub async fn health_check(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let uptime_seconds = state.get_uptime_seconds();
    let queue = state.jobs.stats();
    let upload_dir = state.config.storage.upload_dir.clone();

    let (memory, disk) = web::block(move || (get_memory_info(), get_disk_info(&upload_dir))).await?;

    let status = if queue.worker_running { "healthy" } else { "degraded" };

    Ok(HttpResponse::Ok().json(json!({
        "status": status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        },
        "queue": {
            "depth": queue.queue_depth,
            "processing": queue.processing,
            "current_job": queue.current_job,
            "completed": queue.completed_total,
            "failed": queue.failed_total,
            "evicted": queue.evicted_total,
            "resident_jobs": queue.resident_jobs,
            "max_jobs_in_memory": queue.max_jobs_in_memory,
            "worker_running": queue.worker_running
        },
        "memory": memory,
        "disk": disk
    })))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "active_uploads": metrics.active_uploads,
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats,
        "jobs": state.jobs.stats()
    }))
}

fn get_memory_info() -> serde_json::Value {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return json!({ "available": false });
    };

    let mut system = System::new();
    let _ = system.refresh_processes(ProcessesToUpdate::Some(&[pid]), false);

    match system.process(pid) {
        Some(process) => json!({
            "resident_memory_bytes": process.memory(),
            "virtual_memory_bytes": process.virtual_memory(),
            "available": true
        }),
        None => json!({ "available": false }),
    }
}

/// Space on the filesystem that holds `dir`, or null if it can't be found.
fn get_disk_info(dir: &Path) -> serde_json::Value {
    let target = dir.canonicalize().unwrap_or_else(|_| absolute(dir));
    let disks = Disks::new_with_refreshed_list();

    // The deepest mount point containing the directory is the one it lives on.
    let disk = disks
        .list()
        .iter()
        .filter(|disk| target.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().components().count());

    match disk {
        Some(disk) => {
            let total = disk.total_space();
            let available = disk.available_space();
            let used_percent = if total > 0 {
                ((total - available.min(total)) as f64 / total as f64 * 1000.0).round() / 10.0
            } else {
                0.0
            };
            json!({
                "mount_point": disk.mount_point().display().to_string(),
                "total_bytes": total,
                "available_bytes": available,
                "used_percent": used_percent
            })
        }
        None => serde_json::Value::Null,
    }
}

fn absolute(dir: &Path) -> PathBuf {
    std::env::current_dir()
        .map(|cwd| cwd.join(dir))
        .unwrap_or_else(|_| dir.to_path_buf())
}
