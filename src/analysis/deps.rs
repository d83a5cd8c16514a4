//! File dependency view: imports and imported-by with a symbol
//! breakdown of what is actually used from each imported file.

use std::collections::BTreeMap;

use serde_json::json;

use crate::cancel::CancelToken;
use crate::engine::Engine;
use crate::envelope::Envelope;
use crate::error::Result;

const USED_SYMBOL_SAMPLE: usize = 5;

pub fn run(engine: &Engine, path: &str, cancel: &CancelToken) -> Result<Envelope> {
    cancel.check()?;
    let files = engine.file_graph()?;
    let normalized = path.replace('\\', "/");
    let Some(idx) = files.find_by_path(&normalized) else {
        return Ok(Envelope::new("deps", "not-found")
            .summary_field("path", json!(normalized))
            .payload_field("imports", json!([]))
            .payload_field("imported_by", json!([])));
    };
    let file = files.node(idx);

    // Which target symbols does this file actually use, per target file?
    let mut used_by_target: BTreeMap<String, Vec<String>> = BTreeMap::new();
    {
        let mut stmt = engine.conn().prepare(
            "SELECT DISTINCT tf.path, ts.name
             FROM edges e
             JOIN symbols ss ON e.source_id = ss.id
             JOIN symbols ts ON e.target_id = ts.id
             JOIN files tf ON ts.file_id = tf.id
             WHERE ss.file_id = ?1 AND ts.file_id != ?1
             ORDER BY tf.path, ts.name",
        )?;
        let rows = stmt.query_map([file.id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (target_path, name) = row?;
            used_by_target.entry(target_path).or_default().push(name);
        }
    }

    let imports: Vec<_> = files
        .out_edges(idx)
        .map(|edge| {
            let target = files.node(edge.target);
            let used = used_by_target.get(&target.path).cloned().unwrap_or_default();
            let sample: Vec<&String> = used.iter().take(USED_SYMBOL_SAMPLE).collect();
            json!({
                "path": target.path,
                "symbol_edges": edge.multiplicity,
                "used": sample,
                "used_total": used.len(),
            })
        })
        .collect();

    let mut imported_by = Vec::new();
    for other in 0..files.len() as u32 {
        if other == idx {
            continue;
        }
        for edge in files.out_edges(other) {
            if edge.target == idx {
                imported_by.push(json!({
                    "path": files.node(other).path,
                    "symbol_edges": edge.multiplicity,
                }));
            }
        }
    }

    Ok(Envelope::new("deps", "found")
        .summary_field("path", json!(file.path))
        .summary_field("imports", json!(imports.len()))
        .summary_field("imported_by", json!(imported_by.len()))
        .payload_field("imports", json!(imports))
        .payload_field("imported_by", json!(imported_by)))
}
