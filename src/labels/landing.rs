// Landing measurements
// One CSV per (environment x shot type); rows are keyed into a single table by ShotId.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::config::CourtConfig;
use crate::constants::{
    COL_DIST_BASELINE, COL_DIST_SIDELINE, COL_INDEX, LANDING_FILES, S_BAD_ROW, S_INVALID_COORDS,
};
use crate::coords::{map_shot, NormalizedPoint, ShotType};
use crate::error::{CourtsideError, Result};
use crate::report::BatchReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Environment {
    Indoor,
    Outdoor,
}

/// Recording environment and shot direction; determines the 3-letter id prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShotCategory {
    pub environment: Environment,
    pub shot_type: ShotType,
}

impl ShotCategory {
    pub const ALL: [ShotCategory; 4] = [
        ShotCategory { environment: Environment::Indoor, shot_type: ShotType::Cross },
        ShotCategory { environment: Environment::Indoor, shot_type: ShotType::Straight },
        ShotCategory { environment: Environment::Outdoor, shot_type: ShotType::Cross },
        ShotCategory { environment: Environment::Outdoor, shot_type: ShotType::Straight },
    ];

    pub fn prefix(&self) -> &'static str {
        match (self.environment, self.shot_type) {
            (Environment::Indoor, ShotType::Cross) => "ICT",
            (Environment::Indoor, ShotType::Straight) => "IST",
            (Environment::Outdoor, ShotType::Cross) => "OCT",
            (Environment::Outdoor, ShotType::Straight) => "OST",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.prefix() == prefix)
    }
}

/// Join key between a frame directory and its landing measurement, e.g. `IST07`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShotId {
    pub category: ShotCategory,
    pub index: u32,
}

impl ShotId {
    pub fn new(category: ShotCategory, index: u32) -> Self {
        Self { category, index }
    }

    /// Parse a directory basename. Only the canonical rendering is accepted,
    /// so `IST7` and `IST007` are rejected where `IST07` is expected.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || CourtsideError::InvalidShotId(s.to_string());

        if s.len() < 4 || !s.is_char_boundary(3) {
            return Err(invalid());
        }
        let (prefix, digits) = s.split_at(3);
        let category = ShotCategory::from_prefix(prefix).ok_or_else(invalid)?;
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let index: u32 = digits.parse().map_err(|_| invalid())?;

        let id = ShotId::new(category, index);
        if id.to_string() != s {
            return Err(invalid());
        }
        Ok(id)
    }
}

impl fmt::Display for ShotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02}", self.category.prefix(), self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandingRecord {
    pub shot_id: ShotId,
    pub point: NormalizedPoint,
}

/// All landing records of a run. Built once, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct LandingTable {
    records: BTreeMap<String, LandingRecord>,
}

impl LandingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record; a repeated shot id is fatal
    pub fn insert(&mut self, record: LandingRecord) -> Result<()> {
        let key = record.shot_id.to_string();
        if self.records.contains_key(&key) {
            return Err(CourtsideError::DuplicateShotId(key));
        }
        self.records.insert(key, record);
        Ok(())
    }

    pub fn get(&self, shot_id: &ShotId) -> Option<&LandingRecord> {
        self.records.get(&shot_id.to_string())
    }

    /// Exact-basename lookup
    pub fn lookup(&self, name: &str) -> Option<&LandingRecord> {
        let id = ShotId::parse(name).ok()?;
        self.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LandingRecord> {
        self.records.values()
    }
}

/// Read one category's CSV into `table`
pub fn read_landing_csv<R: Read>(
    reader: R,
    category: ShotCategory,
    court: &CourtConfig,
    table: &mut LandingTable,
    report: &mut BatchReport,
) -> Result<()> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let column = |name: &str| headers.iter().position(|h| h == name);
    let (idx_col, side_col, base_col) = match (column(COL_INDEX), column(COL_DIST_SIDELINE), column(COL_DIST_BASELINE)) {
        (Some(i), Some(s), Some(b)) => (i, s, b),
        _ => {
            return Err(CourtsideError::Config(format!(
                "landing CSV for {} is missing one of the columns {:?}, {:?}, {:?}",
                category.prefix(), COL_INDEX, COL_DIST_SIDELINE, COL_DIST_BASELINE
            )))
        }
    };

    for record in rdr.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                log::debug!("Skipping malformed landing row: {}", e);
                report.skip(S_BAD_ROW);
                continue;
            }
        };

        let index = match record.get(idx_col).and_then(parse_index) {
            Some(i) => i,
            None => {
                report.skip(S_BAD_ROW);
                continue;
            }
        };
        let sideline = record.get(side_col).map(parse_distance).unwrap_or(f64::NAN);
        let baseline = record.get(base_col).map(parse_distance).unwrap_or(f64::NAN);

        let shot_id = ShotId::new(category, index);
        match map_shot(sideline, baseline, category.shot_type, court.width_m, court.length_m) {
            Some(point) => {
                table.insert(LandingRecord { shot_id, point })?;
                report.success();
            }
            None => {
                log::debug!("Dropping {}: invalid coordinates ({}, {})", shot_id, sideline, baseline);
                report.skip(S_INVALID_COORDS);
            }
        }
    }

    Ok(())
}

/// Load every landing CSV found in `dir`. Missing files are warned about and skipped;
/// finding no records at all is a configuration error.
pub fn load_landing_table(dir: &Path, court: &CourtConfig) -> Result<(LandingTable, BatchReport)> {
    let mut table = LandingTable::new();
    let mut report = BatchReport::new("landing records");

    for (filename, prefix) in LANDING_FILES {
        let path = dir.join(filename);
        if !path.exists() {
            log::warn!("Landing CSV not found: {}. Skipping.", path.display());
            continue;
        }
        let Some(category) = ShotCategory::from_prefix(prefix) else {
            continue;
        };

        let file = std::fs::File::open(&path)?;
        match read_landing_csv(file, category, court, &mut table, &mut report) {
            Ok(()) => {}
            Err(CourtsideError::Config(msg)) => {
                log::error!("{} ({}). Skipping.", msg, path.display());
            }
            Err(e) => return Err(e),
        }
    }

    if table.is_empty() {
        return Err(CourtsideError::Config(format!(
            "no landing data loaded from {}",
            dir.display()
        )));
    }

    report.log_summary();
    Ok((table, report))
}

/// Shot index from a cell; "7" and "7.0" are accepted, anything outside u32 is not
fn parse_index(s: &str) -> Option<u32> {
    s.parse::<u32>().ok().or_else(|| {
        let v = s.parse::<f64>().ok()?;
        if !v.is_finite() || v.fract() != 0.0 || v < 0.0 || v > f64::from(u32::MAX) {
            return None;
        }
        u32::try_from(v as u64).ok()
    })
}

fn parse_distance(s: &str) -> f64 {
    s.parse::<f64>().unwrap_or(f64::NAN)
}
