// Copyright 2025 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use spyglass_common::error::Result;
use spyglass_common::expr::{Expression, Extractor, MetaExtractor, Predicate, RelOp};
use spyglass_common::types::Data;

use crate::pipeline::QueryPipeline;

/// The field used to correlate events of a layout with other layouts.
///
/// Interim policy: Zeek layouts correlate by connection `uid`, anything
/// else by `community_id`. A runtime type registry should eventually
/// let layouts designate their own pivot field.
pub fn pivot_field(layout_name: &str) -> &'static str {
    if layout_name.starts_with("zeek") {
        "uid"
    } else {
        "community_id"
    }
}

/// Derive the follow-up query of a pivot: run `source`, collect the
/// distinct pivot-field values of all matching rows, and constrain
/// `target` events to those values.
pub async fn pivot(
    pipeline: &QueryPipeline,
    target: &str,
    source: &Expression,
) -> Result<Expression> {
    let mut values: Vec<Data> = Vec::new();
    let mut handle = pipeline.submit(source.clone());
    while let Some(hit) = handle.next().await {
        let layout = hit.slice.layout().clone();
        let field = pivot_field(layout.name());
        let Some(col) = layout
            .column_index(field)
            .or_else(|| {
                layout
                    .columns()
                    .iter()
                    .position(|c| c.name.ends_with(&format!(".{field}")))
            })
        else {
            tracing::debug!(
                layout = layout.name(),
                field,
                "layout has no pivot field, skipping"
            );
            continue;
        };
        for row in hit.slice.iter_rows() {
            if !hit.ids.contains(row.id()) {
                continue;
            }
            let value = row.datum_at(col).to_owned_data();
            if !value.is_nil() && !values.contains(&value) {
                values.push(value);
            }
        }
    }
    let type_predicate = Expression::Predicate(Predicate::new(
        Extractor::Meta(MetaExtractor::Type),
        RelOp::Eq,
        Data::Str(target.to_owned()),
    ));
    let field_predicate = Expression::Predicate(Predicate::field(
        pivot_field(target),
        RelOp::In,
        Data::List(values),
    ));
    Ok(Expression::and([type_predicate, field_predicate]))
}
