//! The production registry: which tables hold user data and how their rows
//! map back to deletion requests.

use chrono::NaiveDate;

use super::identifiers::{
    CLIENT_ID, ECOSYSTEM_CLIENT_ID, GLEAN_CLIENT_ID, ID, IMPRESSION_ID, PIONEER_ID, POCKET_ID,
    SHIELD_ID, USER_ID,
};
use super::item::DeleteItem;
use crate::error::RegistryError;

// "submission_timestamp" is easy to misspell
pub const SUBMISSION_TIMESTAMP: &str = "submission_timestamp";
pub const SUBMISSION_DATE: &str = "submission_date";

/// First day of data in `telemetry_derived.main_summary_v4`.
const MAIN_SUMMARY_START: (i32, u32, u32) = (2016, 3, 12);
/// First day of data in `telemetry_stable.main_v4`.
const MAIN_PING_START: (i32, u32, u32) = (2018, 11, 1);

/// Days in `[start, end)`.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day < end)
}

fn day(ymd: (i32, u32, u32)) -> NaiveDate {
    let (year, month, day) = ymd;
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

fn requests_since(days: u64) -> String {
    format!(
        "DATE(request.{SUBMISSION_TIMESTAMP}) BETWEEN DATE_SUB(CURRENT_DATE, INTERVAL {days} DAY) AND CURRENT_DATE"
    )
}

fn timestamp_until_today() -> String {
    format!("DATE(target.{SUBMISSION_TIMESTAMP}) <= CURRENT_DATE")
}

fn date_until_today() -> String {
    format!("target.{SUBMISSION_DATE} <= CURRENT_DATE")
}

/// One condition per day, for tables too large to delete from in one pass.
fn daily(column_expr: &str, start: NaiveDate, today: NaiveDate) -> Vec<String> {
    date_range(start, today)
        .map(|day| format!("{column_expr} = '{}'", day.format("%Y-%m-%d")))
        .collect()
}

/// Request-side shapes that most entries are copied from.
struct Templates {
    desktop: DeleteItem,
    sub_date_desktop: DeleteItem,
    activity_stream: DeleteItem,
}

impl Templates {
    fn new() -> Result<Self, RegistryError> {
        let desktop = DeleteItem::new(
            "telemetry_stable.deletion_request_v4",
            CLIENT_ID,
            requests_since(30),
            "telemetry_derived.attitudes_daily_v1",
            CLIENT_ID,
            [timestamp_until_today()],
        )?;
        let sub_date_desktop = desktop
            .with_target_table("search_derived.mobile_search_clients_daily_v1")
            .with_target_date_conditions([date_until_today()])?;
        let activity_stream = desktop
            .with_request_id("payload.processes.parent.scalars.deletion_request_impression_id")
            .with_target_table("activity_stream_stable.impression_stats_v1")
            .with_target_id(IMPRESSION_ID);

        Ok(Self {
            desktop,
            sub_date_desktop,
            activity_stream,
        })
    }
}

fn copies(template: &DeleteItem, tables: &[&str]) -> Vec<DeleteItem> {
    tables
        .iter()
        .map(|table| template.with_target_table(*table))
        .collect()
}

/// Entries the deletion engine executes.
pub(crate) fn supported(today: NaiveDate) -> Result<Vec<DeleteItem>, RegistryError> {
    let Templates {
        desktop,
        sub_date_desktop,
        activity_stream,
    } = Templates::new()?;

    let mut items = vec![desktop.clone(), sub_date_desktop.clone()];

    items.extend(copies(
        &sub_date_desktop,
        &[
            "search_derived.search_clients_daily_v8",
            "search_derived.search_clients_last_seen_v1",
            "telemetry_derived.clients_daily_histogram_aggregates_v1",
            "telemetry_derived.clients_daily_scalar_aggregates_v1",
            "telemetry_derived.clients_daily_v6",
        ],
    ));
    items.push(desktop.with_target_table("telemetry_derived.clients_histogram_aggregates_v1"));
    items.push(sub_date_desktop.with_target_table("telemetry_derived.clients_last_seen_v1"));
    items.extend(copies(
        &desktop,
        &[
            "telemetry_derived.clients_profile_per_install_affected_v1",
            "telemetry_derived.clients_scalar_aggregates_v1",
        ],
    ));
    items.extend(copies(
        &sub_date_desktop,
        &[
            "telemetry_derived.core_clients_daily_v1",
            "telemetry_derived.core_clients_last_seen_v1",
        ],
    ));
    items.extend(copies(
        &desktop,
        &[
            "telemetry_derived.core_live",
            "telemetry_derived.event_events_v1",
            "telemetry_derived.events_live",
            "telemetry_derived.experiments_v1",
            "telemetry_derived.main_events_v1",
        ],
    ));
    items.push(
        sub_date_desktop
            .with_target_table("telemetry_derived.main_summary_v4")
            .with_target_date_conditions(daily(
                &format!("target.{SUBMISSION_DATE}"),
                day(MAIN_SUMMARY_START),
                today,
            ))?,
    );
    items.extend(copies(
        &desktop,
        &[
            "telemetry_stable.block_autoplay_v1",
            "telemetry_stable.crash_v4",
            "telemetry_stable.downgrade_v4",
            "telemetry_stable.event_v4",
            "telemetry_stable.first_shutdown_v4",
            "telemetry_stable.focus_event_v1",
            "telemetry_stable.frecency_update_v4",
            "telemetry_stable.health_v4",
            "telemetry_stable.heartbeat_v4",
        ],
    ));
    items.push(
        desktop
            .with_target_table("telemetry_stable.main_v4")
            .with_target_date_conditions(daily(
                &format!("DATE(target.{SUBMISSION_TIMESTAMP})"),
                day(MAIN_PING_START),
                today,
            ))?,
    );
    items.extend(copies(
        &desktop,
        &[
            "telemetry_stable.modules_v4",
            "telemetry_stable.new_profile_v4",
            "telemetry_stable.saved_session_v4",
            "telemetry_stable.shield_icq_v1_v4",
            "telemetry_stable.shield_study_addon_v3",
            "telemetry_stable.shield_study_error_v3",
            "telemetry_stable.shield_study_v3",
            "telemetry_stable.testpilot_v4",
            "telemetry_stable.third_party_modules_v4",
            "telemetry_stable.untrusted_modules_v4",
            "telemetry_stable.update_v4",
            "telemetry_stable.voice_v4",
            // scratch tables still holding client ids
            "telemetry_derived.test3",
            "telemetry_derived.test4",
            "telemetry_derived.test_daily_original",
            "telemetry_derived.test_histogram_aggregates",
            "telemetry_derived.test_histogram_daily",
            "telemetry_derived.test_scalar_aggregates",
            "telemetry_derived.test_scalars_daily",
        ],
    ));
    items.push(
        sub_date_desktop.with_target_table("search_derived.search_clients_last_seen_v101*"),
    );
    items.push(activity_stream.clone());
    items.extend(copies(
        &activity_stream,
        &[
            "activity_stream_stable.spoc_fills_v1",
            "messaging_system_stable.undesired_events_v1",
        ],
    ));

    Ok(items)
}

/// Glean applications: each has its own deletion request table.
fn glean_app(template: &DeleteItem, app: &str, tables: &[&str]) -> Vec<DeleteItem> {
    let app_template =
        template.with_request_table(format!("org_mozilla_{app}_stable.deletion_request_v1"));
    tables
        .iter()
        .map(|table| app_template.with_target_table(format!("org_mozilla_{app}_stable.{table}")))
        .collect()
}

/// Entries known to hold user identifiers that are not deleted yet.
///
/// They never run; they only keep the coverage audit from reporting tables
/// that have already been looked at.
pub(crate) fn unsupported() -> Result<Vec<DeleteItem>, RegistryError> {
    let Templates {
        desktop,
        sub_date_desktop,
        ..
    } = Templates::new()?;

    let mut items = Vec::new();

    // pocket
    items.push(
        desktop
            .with_target_table("pocket_stable.fire_tv_events_v1")
            .with_target_id(POCKET_ID),
    );

    // fxa
    let fxa = desktop
        .with_target_table("fxa_users_services_daily_v1")
        .with_target_id(USER_ID);
    items.push(fxa.clone());
    items.extend(copies(
        &fxa,
        &[
            "fxa_users_services_first_seen_v1",
            "fxa_users_services_last_seen_v1",
            "telemetry_derived.devtools_events_amplitude_v1",
        ],
    ));

    // internal and mobile pings sent by non-desktop products
    let mobile = desktop
        .with_request_id(format!("normalized_app_name != 'Firefox' AND {CLIENT_ID}"))
        .with_target_table("activity_stream_stable.events_v1");
    items.push(mobile.clone());
    items.extend(copies(
        &mobile,
        &[
            "eng_workflow_stable.build_v1",
            "messaging_system_stable.cfr_v1",
            "messaging_system_stable.onboarding_v1",
            "messaging_system_stable.snippets_v1",
            "mobile_stable.activation_v1",
        ],
    ));
    items.extend(
        (1..=10)
            .map(|version| mobile.with_target_table(format!("telemetry_stable.core_v{version}"))),
    );
    items.extend(copies(
        &mobile,
        &[
            "telemetry_stable.mobile_event_v1",
            "telemetry_stable.mobile_metrics_v1",
        ],
    ));

    // glean
    let glean = desktop
        .with_request_id(GLEAN_CLIENT_ID)
        .with_target_id(GLEAN_CLIENT_ID);
    items.extend(glean_app(
        &glean,
        "fenix",
        &[
            "activation_v1",
            "baseline_v1",
            "bookmarks_sync_v1",
            "events_v1",
            "history_sync_v1",
            "logins_sync_v1",
            "metrics_v1",
        ],
    ));
    let fenix_derived = glean
        .with_request_table("org_mozilla_fenix_stable.deletion_request_v1")
        .with_target_id(CLIENT_ID)
        .with_target_date_conditions(sub_date_desktop.target_date_conditions().to_vec())?;
    items.extend(copies(
        &fenix_derived,
        &[
            "org_mozilla_fenix_derived.clients_daily_v1",
            "org_mozilla_fenix_derived.clients_last_seen_v1",
        ],
    ));
    items.extend(glean_app(
        &glean,
        "fenix_nightly",
        &[
            "activation_v1",
            "baseline_v1",
            "bookmarks_sync_v1",
            "events_v1",
            "history_sync_v1",
            "logins_sync_v1",
            "metrics_v1",
        ],
    ));
    items.extend(glean_app(
        &glean,
        "reference_browser",
        &["baseline_v1", "events_v1", "metrics_v1"],
    ));
    items.extend(glean_app(
        &glean,
        "tv_firefox",
        &["baseline_v1", "events_v1", "metrics_v1"],
    ));
    items.extend(glean_app(
        &glean,
        "vrbrowser",
        &[
            "baseline_v1",
            "bookmarks_sync_v1",
            "events_v1",
            "history_sync_v1",
            "logins_sync_v1",
            "metrics_v1",
            "session_end_v1",
        ],
    ));

    // other
    items.push(
        desktop
            .with_target_table("telemetry_stable.pioneer_study_v4")
            .with_target_id(PIONEER_ID),
    );
    items.push(
        desktop
            .with_target_table("telemetry_stable.pre_account_v4")
            .with_target_id(ECOSYSTEM_CLIENT_ID),
    );
    // TODO: confirm shield_id identifies a user before moving this to supported
    items.push(
        desktop
            .with_target_table("telemetry_derived.survey_gizmo_daily_attitudes")
            .with_target_id(SHIELD_ID),
    );

    let root_id = desktop
        .with_target_table("firefox_launcher_process_stable.launcher_process_failure_v1")
        .with_target_id(ID);
    items.push(root_id.clone());
    items.extend(copies(
        &root_id,
        &[
            "telemetry_derived.origin_content_blocking",
            "telemetry_stable.anonymous_v4",
            "telemetry_stable.optout_v4",
            "telemetry_stable.pre_account_v4",
            "telemetry_stable.prio_v4",
            "telemetry_stable.sync_v4",
            "telemetry_stable.sync_v5",
        ],
    ));

    Ok(items)
}
