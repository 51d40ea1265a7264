use crate::pollctl::io_common::{simplify_file_name, temp_path_for};
use crate::pollctl::*;

use log::{debug, info};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Reads the data file. A missing file is an empty data set.
pub fn read_snapshot(path: &str) -> CliResult<Snapshot> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("read_snapshot: {} does not exist yet, starting empty", path);
            return Ok(Snapshot::default());
        }
        Err(e) => return Err(e).context(OpeningFileSnafu { path }),
    };
    let snapshot: Snapshot = serde_json::from_str(&contents).context(ParsingJsonSnafu { path })?;
    debug!(
        "read_snapshot: {}: {} polls, {} votes",
        simplify_file_name(path),
        snapshot.polls.len(),
        snapshot.votes.len()
    );
    Ok(snapshot)
}

/// Writes the data file. The content goes to a temporary file first, which then
/// replaces the data file, so readers never see a partial file.
pub fn write_snapshot(path: &str, snapshot: &Snapshot) -> CliResult<()> {
    let target = Path::new(path);
    let tmp = temp_path_for(target);
    let tmp_str = tmp.to_string_lossy().to_string();
    let js = serde_json::to_string_pretty(snapshot).context(SerializingJsonSnafu)?;
    fs::write(&tmp, js).context(WritingFileSnafu { path: tmp_str })?;
    fs::rename(&tmp, target).context(WritingFileSnafu { path })?;
    debug!(
        "write_snapshot: {}: {} polls, {} votes",
        simplify_file_name(path),
        snapshot.polls.len(),
        snapshot.votes.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("polls.json");
        let s = read_snapshot(p.to_str().unwrap()).unwrap();
        assert_eq!(s, Snapshot::default());
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("polls.json");
        let path = p.to_str().unwrap();
        let snapshot = Snapshot {
            polls: vec![Poll {
                id: PollId(3),
                title: "Library hours".to_string(),
                description: None,
                options: vec!["Longer".to_string(), "Same".to_string()],
                creator_id: UserId::from("alice"),
                created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
                ends_at: None,
                privacy_mode: PrivacyMode::Public,
                region: Some("North".to_string()),
                topic: None,
                is_active: true,
            }],
            votes: vec![],
        };
        write_snapshot(path, &snapshot).unwrap();
        assert!(!temp_path_for(&p).exists());
        assert_eq!(read_snapshot(path).unwrap(), snapshot);
    }

    #[test]
    fn garbage_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("polls.json");
        fs::write(&p, "not json").unwrap();
        assert!(matches!(
            read_snapshot(p.to_str().unwrap()),
            Err(CliError::ParsingJson { .. })
        ));
    }
}
