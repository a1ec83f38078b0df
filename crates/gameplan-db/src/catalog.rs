use crate::models::{ClassRow, PlanRow};
use crate::Database;
use anyhow::Result;
use rusqlite::OptionalExtension;

/// Per-user plan and class storage. Every lookup is scoped by owner so a
/// foreign id simply comes back as None.
impl Database {
    // -- Plans --

    pub fn create_plan(&self, plan: &PlanRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO plans (id, user_id, title, description, start_date, end_date,
                                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    plan.id,
                    plan.user_id,
                    plan.title,
                    plan.description,
                    plan.start_date,
                    plan.end_date,
                    plan.created_at,
                    plan.updated_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_plan(&self, user_id: &str, plan_id: &str) -> Result<Option<PlanRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, title, description, start_date, end_date,
                            created_at, updated_at
                     FROM plans WHERE id = ?1 AND user_id = ?2",
                    (plan_id, user_id),
                    plan_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_plans(&self, user_id: &str, limit: Option<u32>) -> Result<Vec<PlanRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, description, start_date, end_date,
                        created_at, updated_at
                 FROM plans WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map((user_id, limit.map(i64::from).unwrap_or(-1)), plan_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_plan(&self, plan: &PlanRow) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE plans
                 SET title = ?1, description = ?2, start_date = ?3, end_date = ?4, updated_at = ?5
                 WHERE id = ?6 AND user_id = ?7",
                rusqlite::params![
                    plan.title,
                    plan.description,
                    plan.start_date,
                    plan.end_date,
                    plan.updated_at,
                    plan.id,
                    plan.user_id,
                ],
            )?;
            Ok(n == 1)
        })
    }

    pub fn delete_plan(&self, user_id: &str, plan_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "DELETE FROM plans WHERE id = ?1 AND user_id = ?2",
                (plan_id, user_id),
            )?;
            Ok(n > 0)
        })
    }

    // -- Classes --

    pub fn create_class(&self, class: &ClassRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO classes (id, user_id, title, description, schedule_info,
                                      created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    class.id,
                    class.user_id,
                    class.title,
                    class.description,
                    class.schedule_info,
                    class.created_at,
                    class.updated_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_class(&self, user_id: &str, class_id: &str) -> Result<Option<ClassRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, title, description, schedule_info, created_at, updated_at
                     FROM classes WHERE id = ?1 AND user_id = ?2",
                    (class_id, user_id),
                    class_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_classes(&self, user_id: &str) -> Result<Vec<ClassRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, description, schedule_info, created_at, updated_at
                 FROM classes WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt
                .query_map([user_id], class_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_class(&self, class: &ClassRow) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE classes
                 SET title = ?1, description = ?2, schedule_info = ?3, updated_at = ?4
                 WHERE id = ?5 AND user_id = ?6",
                rusqlite::params![
                    class.title,
                    class.description,
                    class.schedule_info,
                    class.updated_at,
                    class.id,
                    class.user_id,
                ],
            )?;
            Ok(n == 1)
        })
    }

    pub fn delete_class(&self, user_id: &str, class_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "DELETE FROM classes WHERE id = ?1 AND user_id = ?2",
                (class_id, user_id),
            )?;
            Ok(n > 0)
        })
    }

    // -- Class/plan associations --

    /// Idempotent: associating an already-linked plan is a no-op.
    pub fn add_class_plan(&self, class_id: &str, plan_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO class_plans (class_id, plan_id) VALUES (?1, ?2)",
                (class_id, plan_id),
            )?;
            Ok(())
        })
    }

    /// False when the association was not there to remove.
    pub fn remove_class_plan(&self, class_id: &str, plan_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "DELETE FROM class_plans WHERE class_id = ?1 AND plan_id = ?2",
                (class_id, plan_id),
            )?;
            Ok(n > 0)
        })
    }

    pub fn class_plan_ids(&self, class_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT plan_id FROM class_plans WHERE class_id = ?1 ORDER BY rowid",
            )?;
            let ids = stmt
                .query_map([class_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Replace a class's association set wholesale (used by class update).
    pub fn set_class_plans(&self, class_id: &str, plan_ids: &[String]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM class_plans WHERE class_id = ?1", [class_id])?;
            for plan_id in plan_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO class_plans (class_id, plan_id) VALUES (?1, ?2)",
                    (class_id, plan_id),
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }
}

fn plan_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlanRow> {
    Ok(PlanRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn class_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClassRow> {
    Ok(ClassRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        schedule_info: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRow;
    use crate::now_ts;

    fn seed_user(db: &Database, id: &str, email: &str) {
        let now = now_ts();
        db.create_user(&UserRow {
            id: id.to_string(),
            username: "tester".to_string(),
            email: email.to_string(),
            password_hash: "!".to_string(),
            agreed_to_terms: true,
            email_verified: false,
            is_subscribed: false,
            subscription_ref: None,
            customer_ref: None,
            trial_ends_at: now.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
        .unwrap();
    }

    fn seed_plan(db: &Database, id: &str, user_id: &str, title: &str) {
        let now = now_ts();
        db.create_plan(&PlanRow {
            id: id.to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            description: None,
            start_date: None,
            end_date: None,
            created_at: now.clone(),
            updated_at: now,
        })
        .unwrap();
    }

    fn seed_class(db: &Database, id: &str, user_id: &str) {
        let now = now_ts();
        db.create_class(&ClassRow {
            id: id.to_string(),
            user_id: user_id.to_string(),
            title: "class".to_string(),
            description: None,
            schedule_info: None,
            created_at: now.clone(),
            updated_at: now,
        })
        .unwrap();
    }

    #[test]
    fn plans_are_scoped_to_their_owner() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "a@x.com");
        seed_user(&db, "u2", "b@x.com");
        seed_plan(&db, "p1", "u1", "mine");

        assert!(db.get_plan("u1", "p1").unwrap().is_some());
        assert!(db.get_plan("u2", "p1").unwrap().is_none());
        assert!(!db.delete_plan("u2", "p1").unwrap());
        assert!(db.delete_plan("u1", "p1").unwrap());
    }

    #[test]
    fn plan_listing_is_newest_first_and_limited() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "a@x.com");
        for i in 0..7 {
            seed_plan(&db, &format!("p{i}"), "u1", &format!("plan {i}"));
        }

        let all = db.list_plans("u1", None).unwrap();
        assert_eq!(all.len(), 7);
        assert_eq!(all[0].title, "plan 6");

        let recent = db.list_plans("u1", Some(5)).unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].title, "plan 6");
        assert_eq!(recent[4].title, "plan 2");
    }

    #[test]
    fn update_plan_respects_ownership() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "a@x.com");
        seed_plan(&db, "p1", "u1", "before");

        let mut plan = db.get_plan("u1", "p1").unwrap().unwrap();
        plan.title = "after".to_string();
        plan.updated_at = now_ts();
        assert!(db.update_plan(&plan).unwrap());
        assert_eq!(db.get_plan("u1", "p1").unwrap().unwrap().title, "after");

        plan.user_id = "u2".to_string();
        assert!(!db.update_plan(&plan).unwrap());
    }

    #[test]
    fn association_add_remove_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "a@x.com");
        seed_class(&db, "c1", "u1");
        seed_plan(&db, "p1", "u1", "drills");

        assert!(db.class_plan_ids("c1").unwrap().is_empty());

        db.add_class_plan("c1", "p1").unwrap();
        db.add_class_plan("c1", "p1").unwrap(); // idempotent
        assert_eq!(db.class_plan_ids("c1").unwrap(), vec!["p1".to_string()]);

        assert!(db.remove_class_plan("c1", "p1").unwrap());
        assert!(db.class_plan_ids("c1").unwrap().is_empty());

        // removing again reports the absence
        assert!(!db.remove_class_plan("c1", "p1").unwrap());
    }

    #[test]
    fn deleting_a_plan_cascades_out_of_classes() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "a@x.com");
        seed_class(&db, "c1", "u1");
        seed_plan(&db, "p1", "u1", "drills");
        db.add_class_plan("c1", "p1").unwrap();

        assert!(db.delete_plan("u1", "p1").unwrap());
        assert!(db.class_plan_ids("c1").unwrap().is_empty());
    }

    #[test]
    fn set_class_plans_replaces_the_whole_set() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "a@x.com");
        seed_class(&db, "c1", "u1");
        seed_plan(&db, "p1", "u1", "one");
        seed_plan(&db, "p2", "u1", "two");
        db.add_class_plan("c1", "p1").unwrap();

        db.set_class_plans("c1", &["p2".to_string()]).unwrap();
        assert_eq!(db.class_plan_ids("c1").unwrap(), vec!["p2".to_string()]);
    }
}
