use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Params, Row};

use crate::{
    db::{
        helpers::{
            day_window, duration_seconds, parse_datetime, parse_optional_datetime, to_timestamp,
            whole_seconds,
        },
        models::TimeSlot,
        Database,
    },
    error::{TrackerError, TrackerResult},
    log_info,
};

const ENABLE_LOGS: bool = true;

fn row_to_time_slot(row: &Row) -> TrackerResult<TimeSlot> {
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;

    Ok(TimeSlot {
        id: row.get("id")?,
        task_name: row.get("task_name")?,
        start_time: parse_datetime(&start_time, "start_time")?,
        end_time: parse_optional_datetime(end_time, "end_time")?,
        duration_seconds: row.get("duration_seconds")?,
    })
}

fn collect_time_slots<P: Params>(conn: &Connection, sql: &str, args: P) -> TrackerResult<Vec<TimeSlot>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(args)?;
    let mut slots = Vec::new();
    while let Some(row) = rows.next()? {
        slots.push(row_to_time_slot(row)?);
    }
    Ok(slots)
}

fn find_time_slot(conn: &Connection, id: i64) -> TrackerResult<TimeSlot> {
    let mut stmt = conn.prepare(
        "SELECT id, task_name, start_time, end_time, duration_seconds
         FROM time_slots
         WHERE id = ?1",
    )?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => row_to_time_slot(row),
        None => Err(TrackerError::NotFound(id)),
    }
}

pub(crate) fn validate_task_name(task_name: &str) -> TrackerResult<()> {
    if task_name.trim().is_empty() {
        return Err(TrackerError::Validation("task name must not be empty".into()));
    }
    Ok(())
}

impl Database {
    /// Insert a new active slot starting at `start_time`.
    pub async fn create_time_slot(
        &self,
        task_name: &str,
        start_time: DateTime<Utc>,
    ) -> TrackerResult<TimeSlot> {
        validate_task_name(task_name)?;
        let start_time = whole_seconds(start_time);
        let task_name = task_name.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO time_slots (task_name, start_time) VALUES (?1, ?2)",
                params![task_name, to_timestamp(&start_time)],
            )?;

            Ok(TimeSlot {
                id: conn.last_insert_rowid(),
                task_name,
                start_time,
                end_time: None,
                duration_seconds: 0,
            })
        })
        .await
    }

    /// Close an active slot at `end_time`. Closing a slot twice is rejected rather than
    /// silently moving its end.
    pub async fn close_time_slot(&self, id: i64, end_time: DateTime<Utc>) -> TrackerResult<TimeSlot> {
        let end_time = whole_seconds(end_time);
        self.execute(move |conn| {
            let slot = find_time_slot(conn, id)?;
            if !slot.is_active() {
                return Err(TrackerError::Validation(format!(
                    "time slot {id} is already closed"
                )));
            }
            if end_time < slot.start_time {
                return Err(TrackerError::Validation(format!(
                    "end time {} is before start time {}",
                    to_timestamp(&end_time),
                    to_timestamp(&slot.start_time)
                )));
            }

            let duration = duration_seconds(&slot.start_time, &end_time);
            let rows_affected = conn.execute(
                "UPDATE time_slots
                 SET end_time = ?1,
                     duration_seconds = ?2
                 WHERE id = ?3 AND end_time IS NULL",
                params![to_timestamp(&end_time), duration, id],
            )?;
            if rows_affected == 0 {
                return Err(TrackerError::NotFound(id));
            }

            Ok(TimeSlot {
                end_time: Some(end_time),
                duration_seconds: duration,
                ..slot
            })
        })
        .await
    }

    /// The open slot, if any. Newest first should more than one ever exist.
    pub async fn active_time_slot(&self) -> TrackerResult<Option<TimeSlot>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, task_name, start_time, end_time, duration_seconds
                 FROM time_slots
                 WHERE end_time IS NULL
                 ORDER BY start_time DESC, id DESC
                 LIMIT 1",
            )?;

            let mut rows = stmt.query([])?;
            let slot = match rows.next()? {
                Some(row) => Some(row_to_time_slot(row)?),
                None => None,
            };
            Ok(slot)
        })
        .await
    }

    pub async fn get_time_slot(&self, id: i64) -> TrackerResult<TimeSlot> {
        self.execute(move |conn| find_time_slot(conn, id)).await
    }

    /// Every slot, newest first.
    pub async fn list_time_slots(&self) -> TrackerResult<Vec<TimeSlot>> {
        self.execute(|conn| {
            collect_time_slots(
                conn,
                "SELECT id, task_name, start_time, end_time, duration_seconds
                 FROM time_slots
                 ORDER BY start_time DESC, id DESC",
                [],
            )
        })
        .await
    }

    /// Slots starting within the local day `date`, oldest first.
    pub async fn time_slots_by_date(&self, date: NaiveDate) -> TrackerResult<Vec<TimeSlot>> {
        let (day_start, day_end) = day_window(date)?;
        self.execute(move |conn| {
            collect_time_slots(
                conn,
                "SELECT id, task_name, start_time, end_time, duration_seconds
                 FROM time_slots
                 WHERE start_time >= ?1 AND start_time < ?2
                 ORDER BY start_time ASC, id ASC",
                params![to_timestamp(&day_start), to_timestamp(&day_end)],
            )
        })
        .await
    }

    /// Seconds spent per task on the local day `date`. Only closed slots count.
    pub async fn task_totals_by_date(&self, date: NaiveDate) -> TrackerResult<HashMap<String, i64>> {
        let (day_start, day_end) = day_window(date)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT task_name, SUM(duration_seconds) AS total_seconds
                 FROM time_slots
                 WHERE start_time >= ?1 AND start_time < ?2 AND end_time IS NOT NULL
                 GROUP BY task_name",
            )?;

            let mut rows =
                stmt.query(params![to_timestamp(&day_start), to_timestamp(&day_end)])?;
            let mut totals = HashMap::new();
            while let Some(row) = rows.next()? {
                let task_name: String = row.get("task_name")?;
                let total_seconds: i64 = row.get("total_seconds")?;
                totals.insert(task_name, total_seconds);
            }

            Ok(totals)
        })
        .await
    }

    /// Overwrite a slot's name and times; the duration is always recomputed.
    pub async fn update_time_slot(
        &self,
        id: i64,
        task_name: &str,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> TrackerResult<TimeSlot> {
        validate_task_name(task_name)?;
        let start_time = whole_seconds(start_time);
        let end_time = end_time.map(whole_seconds);
        if let Some(end) = end_time {
            if end <= start_time {
                return Err(TrackerError::Validation(format!(
                    "end time {} must be after start time {}",
                    to_timestamp(&end),
                    to_timestamp(&start_time)
                )));
            }
        }

        let duration = end_time
            .map(|end| duration_seconds(&start_time, &end))
            .unwrap_or(0);
        let task_name = task_name.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE time_slots
                 SET task_name = ?1,
                     start_time = ?2,
                     end_time = ?3,
                     duration_seconds = ?4
                 WHERE id = ?5",
                params![
                    task_name,
                    to_timestamp(&start_time),
                    end_time.as_ref().map(to_timestamp),
                    duration,
                    id,
                ],
            )?;

            if rows_affected == 0 {
                return Err(TrackerError::NotFound(id));
            }

            log_info!("Updated time slot {id} ({task_name}, {duration}s)");
            Ok(TimeSlot {
                id,
                task_name,
                start_time,
                end_time,
                duration_seconds: duration,
            })
        })
        .await
    }

    pub async fn delete_time_slot(&self, id: i64) -> TrackerResult<()> {
        self.execute(move |conn| {
            let rows_affected = conn
                .execute("DELETE FROM time_slots WHERE id = ?1", params![id])?;

            if rows_affected == 0 {
                return Err(TrackerError::NotFound(id));
            }

            log_info!("Deleted time slot {id}");
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Local, TimeZone};

    use super::*;
    use crate::db::testing::test_database;

    fn local(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
        Local
            .from_local_datetime(&date.and_hms_opt(hour, minute, 0).unwrap())
            .earliest()
            .unwrap()
            .with_timezone(&Utc)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 12).unwrap()
    }

    #[tokio::test]
    async fn create_then_close_computes_duration() {
        let (_dir, db) = test_database();
        let start = local(day(), 9, 0);

        let slot = db.create_time_slot("writing", start).await.unwrap();
        assert!(slot.is_active());
        assert_eq!(slot.duration_seconds, 0);

        let closed = db
            .close_time_slot(slot.id, start + Duration::seconds(3600))
            .await
            .unwrap();
        assert_eq!(closed.duration_seconds, 3600);
        assert_eq!(db.get_time_slot(slot.id).await.unwrap(), closed);
        assert!(db.active_time_slot().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_rejects_blank_task_name() {
        let (_dir, db) = test_database();
        let err = db.create_time_slot("   ", local(day(), 9, 0)).await.unwrap_err();
        assert!(err.is_validation());
        assert!(db.list_time_slots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_open_slot_is_rejected() {
        let (_dir, db) = test_database();
        db.create_time_slot("a", local(day(), 9, 0)).await.unwrap();

        let err = db.create_time_slot("b", local(day(), 10, 0)).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn closing_twice_is_rejected() {
        let (_dir, db) = test_database();
        let start = local(day(), 9, 0);
        let slot = db.create_time_slot("a", start).await.unwrap();
        let closed = db.close_time_slot(slot.id, start + Duration::minutes(30)).await.unwrap();

        let err = db
            .close_time_slot(slot.id, start + Duration::minutes(45))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(db.get_time_slot(slot.id).await.unwrap(), closed);
    }

    #[tokio::test]
    async fn close_missing_slot_is_not_found() {
        let (_dir, db) = test_database();
        let err = db.close_time_slot(42, local(day(), 9, 0)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn by_date_lists_only_that_day_in_order() {
        let (_dir, db) = test_database();
        let next_day = day().succ_opt().unwrap();
        let prev_day = day().pred_opt().unwrap();

        for (name, start, minutes) in [
            ("late", local(day(), 23, 0), 30),
            ("early", local(day(), 0, 0), 15),
            ("yesterday", local(prev_day, 23, 30), 60),
            ("tomorrow", local(next_day, 0, 0), 10),
        ] {
            let slot = db.create_time_slot(name, start).await.unwrap();
            db.close_time_slot(slot.id, start + Duration::minutes(minutes))
                .await
                .unwrap();
        }

        let names: Vec<String> = db
            .time_slots_by_date(day())
            .await
            .unwrap()
            .into_iter()
            .map(|slot| slot.task_name)
            .collect();
        assert_eq!(names, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn totals_exclude_active_slot() {
        let (_dir, db) = test_database();
        for (name, hour, minutes) in [("code", 9, 60), ("mail", 10, 15), ("code", 11, 30)] {
            let start = local(day(), hour, 0);
            let slot = db.create_time_slot(name, start).await.unwrap();
            db.close_time_slot(slot.id, start + Duration::minutes(minutes))
                .await
                .unwrap();
        }
        db.create_time_slot("code", local(day(), 13, 0)).await.unwrap();

        let totals = db.task_totals_by_date(day()).await.unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals["code"], 90 * 60);
        assert_eq!(totals["mail"], 15 * 60);

        let listed = db.time_slots_by_date(day()).await.unwrap();
        let closed_sum: i64 = listed
            .iter()
            .filter(|slot| !slot.is_active())
            .map(|slot| slot.duration_seconds)
            .sum();
        assert_eq!(closed_sum, totals.values().sum::<i64>());
    }

    #[tokio::test]
    async fn update_round_trips_and_recomputes_duration() {
        let (_dir, db) = test_database();
        let start = local(day(), 9, 0);
        let slot = db.create_time_slot("draft", start).await.unwrap();
        db.close_time_slot(slot.id, start + Duration::minutes(5)).await.unwrap();

        let new_start = local(day(), 8, 0);
        let new_end = local(day(), 8, 45);
        db.update_time_slot(slot.id, "review", new_start, Some(new_end))
            .await
            .unwrap();

        let stored = db.get_time_slot(slot.id).await.unwrap();
        assert_eq!(stored.task_name, "review");
        assert_eq!(stored.start_time, new_start);
        assert_eq!(stored.end_time, Some(new_end));
        assert_eq!(stored.duration_seconds, 45 * 60);
    }

    #[tokio::test]
    async fn update_with_inverted_times_leaves_record_unchanged() {
        let (_dir, db) = test_database();
        let start = local(day(), 9, 0);
        let slot = db.create_time_slot("draft", start).await.unwrap();
        let closed = db.close_time_slot(slot.id, start + Duration::minutes(5)).await.unwrap();

        for end in [start, start - Duration::minutes(1)] {
            let err = db
                .update_time_slot(slot.id, "renamed", start, Some(end))
                .await
                .unwrap_err();
            assert!(err.is_validation());
        }
        assert_eq!(db.get_time_slot(slot.id).await.unwrap(), closed);
    }

    #[tokio::test]
    async fn reopening_while_another_is_active_is_rejected() {
        let (_dir, db) = test_database();
        let start = local(day(), 9, 0);
        let first = db.create_time_slot("a", start).await.unwrap();
        let closed = db.close_time_slot(first.id, start + Duration::minutes(5)).await.unwrap();
        db.create_time_slot("b", local(day(), 10, 0)).await.unwrap();

        let err = db
            .update_time_slot(first.id, "a", start, None)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(db.get_time_slot(first.id).await.unwrap(), closed);
    }

    #[tokio::test]
    async fn update_and_delete_missing_slot_are_not_found() {
        let (_dir, db) = test_database();
        let start = local(day(), 9, 0);

        assert!(db
            .update_time_slot(7, "x", start, None)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(db.delete_time_slot(7).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn delete_removes_slot() {
        let (_dir, db) = test_database();
        let slot = db.create_time_slot("a", local(day(), 9, 0)).await.unwrap();

        db.delete_time_slot(slot.id).await.unwrap();
        assert!(db.get_time_slot(slot.id).await.unwrap_err().is_not_found());

        // Ids are never handed out again.
        let next = db.create_time_slot("b", local(day(), 10, 0)).await.unwrap();
        assert!(next.id > slot.id);
    }

    #[tokio::test]
    async fn sub_second_inputs_match_stored_rows() {
        let (_dir, db) = test_database();
        let start = local(day(), 9, 0);

        let slot = db
            .create_time_slot("a", start + Duration::milliseconds(900))
            .await
            .unwrap();
        assert_eq!(slot.start_time, start);
        assert_eq!(db.get_time_slot(slot.id).await.unwrap(), slot);

        // Both ends fall inside the same second once stored.
        let err = db
            .update_time_slot(
                slot.id,
                "a",
                start + Duration::milliseconds(100),
                Some(start + Duration::milliseconds(900)),
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(db.get_time_slot(slot.id).await.unwrap(), slot);

        let updated = db
            .update_time_slot(
                slot.id,
                "a",
                start + Duration::milliseconds(900),
                Some(start + Duration::milliseconds(1100)),
            )
            .await
            .unwrap();
        assert_eq!(updated.duration_seconds, 1);
        assert_eq!(updated.end_time, Some(start + Duration::seconds(1)));
        assert_eq!(db.get_time_slot(slot.id).await.unwrap(), updated);

        let reopened = db.update_time_slot(slot.id, "a", start, None).await.unwrap();
        let closed = db
            .close_time_slot(reopened.id, start + Duration::milliseconds(60_500))
            .await
            .unwrap();
        assert_eq!(closed.duration_seconds, 60);
        assert_eq!(db.get_time_slot(slot.id).await.unwrap(), closed);
    }
}
