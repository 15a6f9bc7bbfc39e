// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Journal-based log and alert pipeline (§4.5): cursor-persisted journal
//! readers that classify entries into service, core-component, or system
//! alert streams, and serve log/crash-log requests off a bounded queue.

pub mod alerts;
pub mod archivator;
pub mod journal;
pub mod logs;

pub use alerts::{
    AlertReader, AlertSender, AlertVariant, CoreAlert, CoreComponent, InstanceInfoProvider, JournalAlertsConfig,
    ServiceInstanceAlert, SystemAlert, CORE_COMPONENTS,
};
pub use archivator::{absent_response, error_response, Archivator, ArchivatorConfig, LogObserver, LogStatus, PushLog};
pub use journal::{JournalContract, JournalEntry, JournalFactory};
pub use logs::{InstanceFilter, InstanceIdProvider, LogProvider, LoggingConfig, RequestLog};
