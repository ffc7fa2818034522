//! Turns registry entries into delete statements.
//!
//! Each statement is a single set-based `MERGE ... WHEN MATCHED THEN DELETE`
//! joining target rows to request rows on the identifier. Request rows are
//! never touched, and issuing a statement again after it succeeded matches
//! nothing.

use crate::registry::DeleteItem;

/// Statement for one target date condition of `item`.
pub fn compile(item: &DeleteItem, target_date_condition: &str) -> String {
    format!(
        "MERGE `{target_table}` AS target\n\
         USING `{request_table}` AS request\n\
         ON request.{request_id} = target.{target_id}\n  \
         AND {request_date_condition}\n  \
         AND {target_date_condition}\n\
         WHEN MATCHED THEN DELETE",
        target_table = item.target_table(),
        request_table = item.request_table(),
        request_id = item.request_id(),
        target_id = item.target_id(),
        request_date_condition = item.request_date_condition(),
    )
}

/// One statement per target date condition, in registry order.
pub fn compile_item(item: &DeleteItem) -> Vec<String> {
    item.target_date_conditions()
        .iter()
        .map(|condition| compile(item, condition))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(conditions: &[&str]) -> DeleteItem {
        DeleteItem::new(
            "telemetry_stable.deletion_request_v4",
            "client_id",
            "DATE(request.submission_timestamp) <= CURRENT_DATE",
            "telemetry_stable.crash_v4",
            "client_id",
            conditions.iter().copied(),
        )
        .unwrap()
    }

    #[test]
    fn test_statement_text_is_exact() {
        let statement = compile(
            &item(&["DATE(target.submission_timestamp) = '2020-01-01'"]),
            "DATE(target.submission_timestamp) = '2020-01-01'",
        );

        let expected = "MERGE `telemetry_stable.crash_v4` AS target
USING `telemetry_stable.deletion_request_v4` AS request
ON request.client_id = target.client_id
  AND DATE(request.submission_timestamp) <= CURRENT_DATE
  AND DATE(target.submission_timestamp) = '2020-01-01'
WHEN MATCHED THEN DELETE";
        assert_eq!(statement, expected);
    }

    #[test]
    fn test_single_condition_contains_every_field() {
        let item = DeleteItem::new("R", "req_key", "req_cond", "T", "tgt_key", ["c"]).unwrap();
        let statements = compile_item(&item);

        assert_eq!(statements.len(), 1);
        let statement = &statements[0];
        for fragment in ["T", "R", "req_key", "tgt_key", "req_cond", "c"] {
            assert!(statement.contains(fragment), "missing {fragment}");
        }
    }

    #[test]
    fn test_one_statement_per_condition() {
        let statements = compile_item(&item(&["d1", "d2", "d3"]));
        assert_eq!(statements.len(), 3);
        assert!(statements[0].contains("AND d1\n"));
        assert!(statements[1].contains("AND d2\n"));
        assert!(statements[2].contains("AND d3\n"));
    }

    #[test]
    fn test_raw_sql_request_id_is_kept_verbatim() {
        let item =
            item(&["TRUE"]).with_request_id("normalized_app_name != 'Firefox' AND client_id");
        let statement = compile(&item, "TRUE");
        assert!(statement.contains(
            "ON request.normalized_app_name != 'Firefox' AND client_id = target.client_id"
        ));
    }
}
