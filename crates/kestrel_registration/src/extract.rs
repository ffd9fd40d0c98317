//! Marker-row consumption: streaming a node's initial load inside an open
//! extraction batch.
//!
//! The reload path enqueues marker rows (see [`crate::reload`]); when the
//! extraction pipeline reaches one, it hands the marker here. The marker's
//! position in the batch stream is where the dataset is written — inline,
//! unbuffered, flushed as soon as the trigger's rows are out.

use std::io::Write;
use std::sync::Arc;

use tracing::error;

use kestrel_common::error::{KestrelError, KestrelResult};
use kestrel_common::model::{ExtractionContext, MarkerRow, Node, Trigger};

use crate::store::{NodeStore, TriggerRouterSource};

/// Streams a node's full shared configuration to an output channel.
pub trait ConfigurationExtractor: Send + Sync {
    fn extract_configuration(&self, node: &Node, out: &mut dyn Write) -> KestrelResult<()>;
}

/// Streams one trigger's initial-load rows for a node within an already
/// open batch. Row selection and serialization live behind this seam.
pub trait InitialLoadExtractor: Send + Sync {
    fn extract_initial_load_within_batch(
        &self,
        node: &Node,
        trigger: &Trigger,
        out: &mut dyn Write,
        ctx: &ExtractionContext,
    ) -> KestrelResult<()>;
}

/// Resolves the trigger behind a reload marker, applies any row-supplied
/// override of the load-selection predicate, and streams the dataset.
pub struct InitialLoadStreamExtractor {
    store: Arc<dyn NodeStore>,
    triggers: Arc<dyn TriggerRouterSource>,
    extractor: Arc<dyn InitialLoadExtractor>,
}

impl InitialLoadStreamExtractor {
    pub fn new(
        store: Arc<dyn NodeStore>,
        triggers: Arc<dyn TriggerRouterSource>,
        extractor: Arc<dyn InitialLoadExtractor>,
    ) -> Self {
        Self {
            store,
            triggers,
            extractor,
        }
    }

    /// Stream the dataset behind one marker row at the marker's position
    /// within the batch.
    ///
    /// A marker whose trigger has since been dropped is skipped with an
    /// error log; it never fails the surrounding batch. The marker's
    /// override predicate applies to this extraction only — the stored
    /// trigger definition is not touched.
    pub fn extract(
        &self,
        out: &mut dyn Write,
        marker: &MarkerRow,
        ctx: &ExtractionContext,
    ) -> KestrelResult<()> {
        let Some(mut trigger) = self.triggers.trigger_by_history(marker.trigger_hist_id)? else {
            error!(
                trigger_hist_id = marker.trigger_hist_id,
                "trigger is no longer available for an initial load; skipping marker",
            );
            return Ok(());
        };

        if let Some(row_data) = &marker.row_data {
            if !row_data.is_empty() {
                trigger.initial_load_select = Some(row_data.clone());
            }
        }

        let node = self.store.find_node(&ctx.node_id)?.ok_or_else(|| {
            KestrelError::Internal(format!(
                "batch {} is destined for unknown node {}",
                ctx.batch_id, ctx.node_id
            ))
        })?;

        self.extractor
            .extract_initial_load_within_batch(&node, &trigger, out, ctx)?;
        out.flush()?;
        Ok(())
    }
}
