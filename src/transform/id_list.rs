use async_trait::async_trait;

use super::{RecordTransformer, TransformerKind};
use crate::models::{FailureKind, Record, TransformResult};

/// Passes listed ids through to an id-keyed write after checking their shape.
///
/// Ids are never reformatted; one that does not parse as a UUID is reported
/// instead of being sent to the store.
#[derive(Debug, Clone, Default)]
pub struct IdListTransformer;

#[async_trait]
impl RecordTransformer for IdListTransformer {
    fn name(&self) -> &str {
        "id_list"
    }

    fn kind(&self) -> TransformerKind {
        TransformerKind::Local
    }

    async fn transform(&self, record: &Record) -> TransformResult {
        if record.id.is_uuid() {
            TransformResult::selected(record.id.clone())
        } else {
            TransformResult::failed(
                record.id.clone(),
                FailureKind::Validation,
                format!("'{}' is not a UUID", record.id),
            )
        }
    }
}
