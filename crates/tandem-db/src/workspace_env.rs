use std::collections::BTreeMap;

use rusqlite::{params, Connection};

/// Environment overrides stored for one workspace.
pub fn get_workspace_env(
    conn: &Connection,
    workspace_id: &str,
) -> rusqlite::Result<BTreeMap<String, String>> {
    let mut stmt = conn.prepare(
        "SELECT key, value FROM workspace_env WHERE workspace_id = ?1 ORDER BY key",
    )?;
    let rows = stmt.query_map(params![workspace_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    rows.collect()
}

/// Replace all overrides for a workspace.
pub fn set_workspace_env(
    conn: &mut Connection,
    workspace_id: &str,
    env: &BTreeMap<String, String>,
) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM workspace_env WHERE workspace_id = ?1",
        params![workspace_id],
    )?;
    {
        let mut insert = tx.prepare(
            "INSERT INTO workspace_env (workspace_id, key, value) VALUES (?1, ?2, ?3)",
        )?;
        for (key, value) in env {
            insert.execute(params![workspace_id, key, value])?;
        }
    }
    tx.commit()
}
