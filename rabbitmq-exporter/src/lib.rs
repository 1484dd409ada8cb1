//! Prometheus exporter for the `RabbitMQ` management API
//!
//! Usage:
//! ```text
//! rabbitmq-exporter --rabbit-url=http://rabbit.host:15672 --rabbit-user=monitoring
//! ```
//!
//! Every request to `/metrics` scrapes the management API and reports
//! the result in the OpenMetrics text format. `/api/overview` is always
//! scraped. Its node and cluster names label the metrics of the other
//! exporters, which are enabled with `--exporters`:
//!
//! | exporter      | endpoint                 |
//! |---------------|--------------------------|
//! | `queue`       | `/api/queues`            |
//! | `exchange`    | `/api/exchanges`         |
//! | `node`        | `/api/nodes`             |
//! | `connections` | `/api/connections`       |
//! | `shovel`      | `/api/shovels`           |
//! | `federation`  | `/api/federation-links`  |
//!
//! A failing endpoint only loses its own metrics. It is reported as
//! `rabbitmq_module_up{module="..."} 0` and makes `rabbitmq_up` and
//! `/health` report the scrape as failed.
//!
//! When the `bert` capability is enabled, the exporter asks for replies
//! in the Erlang external term format, which the broker produces with
//! less overhead than JSON. Both are decoded by
//! [`rabbit_reply`] into the same metrics.
//!
//! ## Feature flags
#![doc = document_features::document_features!()]
#![cfg_attr(all(doc, CHANNEL_NIGHTLY), feature(doc_auto_cfg))]
// Clippy lints
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::single_match_else)]
#![warn(clippy::missing_docs_in_private_items)]
#![warn(clippy::self_named_module_files)]
#![warn(clippy::perf)]
#![deny(missing_docs)]
#![warn(clippy::missing_panics_doc)]

pub mod cli;
pub mod client;
pub mod exporter;
pub mod scraper;
pub mod server;
