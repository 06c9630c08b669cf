//! Metrics definitions for the roster.

use shared::metrics_defs::{MetricDef, MetricType};

pub const RECORD_CACHE_HIT: MetricDef = MetricDef {
    name: "read_cache.record.hit",
    metric_type: MetricType::Counter,
    description: "Number of record lookups served from the read cache",
};

pub const RECORD_CACHE_MISS: MetricDef = MetricDef {
    name: "read_cache.record.miss",
    metric_type: MetricType::Counter,
    description: "Number of record lookups that read through to the store",
};

pub const MEMBERS_CACHE_HIT: MetricDef = MetricDef {
    name: "read_cache.members.hit",
    metric_type: MetricType::Counter,
    description: "Number of grouping-members lookups served from the read cache",
};

pub const MEMBERS_CACHE_MISS: MetricDef = MetricDef {
    name: "read_cache.members.miss",
    metric_type: MetricType::Counter,
    description: "Number of grouping-members lookups that read through to the store",
};

pub const MEMBERS_CACHE_INVALIDATION: MetricDef = MetricDef {
    name: "read_cache.members.invalidation",
    metric_type: MetricType::Counter,
    description: "Number of grouping-members entries invalidated by the sync engine",
};

pub const SYNC_INSERTED: MetricDef = MetricDef {
    name: "sync.inserted",
    metric_type: MetricType::Counter,
    description: "Number of syncs that created a new record",
};

pub const SYNC_UNCHANGED: MetricDef = MetricDef {
    name: "sync.unchanged",
    metric_type: MetricType::Counter,
    description: "Number of syncs skipped because the record was already synced today",
};

pub const SYNC_REFRESHED: MetricDef = MetricDef {
    name: "sync.refreshed",
    metric_type: MetricType::Counter,
    description: "Number of syncs that merged fresh upstream data into an existing record",
};

pub const SYNC_FAILED: MetricDef = MetricDef {
    name: "sync.failed",
    metric_type: MetricType::Counter,
    description: "Number of syncs that returned an error",
};

pub const UNION_SEEDED: MetricDef = MetricDef {
    name: "sync.union_seeded",
    metric_type: MetricType::Histogram,
    description: "Number of bare union member records inserted per sync",
};

pub const REPARENTED_ROWS: MetricDef = MetricDef {
    name: "sync.reparented_rows",
    metric_type: MetricType::Histogram,
    description: "Number of sibling records moved to a new grouping parent per sync",
};

pub const RANKING_SEEDED: MetricDef = MetricDef {
    name: "ranking_seed.inserted",
    metric_type: MetricType::Counter,
    description: "Number of records inserted from ranking entries",
};

pub const UPSTREAM_REQUEST_DURATION: MetricDef = MetricDef {
    name: "upstream.request.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete a single upstream API request in seconds",
};

pub const UPSTREAM_RETRIES: MetricDef = MetricDef {
    name: "upstream.request.retries",
    metric_type: MetricType::Counter,
    description: "Number of upstream requests retried after a retriable status",
};

/// Every metric above; described to the recorder at startup.
pub const ALL_METRICS: &[MetricDef] = &[
    RECORD_CACHE_HIT,
    RECORD_CACHE_MISS,
    MEMBERS_CACHE_HIT,
    MEMBERS_CACHE_MISS,
    MEMBERS_CACHE_INVALIDATION,
    SYNC_INSERTED,
    SYNC_UNCHANGED,
    SYNC_REFRESHED,
    SYNC_FAILED,
    UNION_SEEDED,
    REPARENTED_ROWS,
    RANKING_SEEDED,
    UPSTREAM_REQUEST_DURATION,
    UPSTREAM_RETRIES,
];
