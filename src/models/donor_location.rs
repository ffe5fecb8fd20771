//! Donor location model and its stored record shape

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::errors::{AppError, AppResult, RepositoryError};
use crate::utils::geohash::{self, GeoPoint};

/// Geohash prefix length of the store partition (`GSI1PK`)
pub const GEO_PARTITION_PREFIX_LENGTH: usize = 4;

const USER_KEY_PREFIX: &str = "USER#";
const LOCATION_KEY_PREFIX: &str = "LOCATION#";

static LOCATION_INDEX_KEY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^LOCATION#(.+)-([0-9a-z]*)#BG#(.+)#DONATIONSTATUS#(true|false)$").ok()
});

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
pub enum BloodGroup {
    #[serde(rename = "A+")]
    #[strum(serialize = "A+")]
    APositive,
    #[serde(rename = "A-")]
    #[strum(serialize = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    #[strum(serialize = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    #[strum(serialize = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    #[strum(serialize = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    #[strum(serialize = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    #[strum(serialize = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    #[strum(serialize = "O-")]
    ONegative,
}

/// A donor's declared donation point
///
/// A donor may declare several locations; each is replaced as a whole when
/// the donor updates their preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonorLocation {
    pub donor_id: String,
    pub location_id: String,
    /// Country or administrative-area code
    pub area: String,
    pub latitude: f64,
    pub longitude: f64,
    pub geohash: String,
    pub blood_group: BloodGroup,
    pub available_for_donation: bool,
    pub last_vaccinated_date: Option<NaiveDate>,
}

impl DonorLocation {
    /// Build a location, deriving its geohash from the coordinates
    pub fn new(
        donor_id: impl Into<String>,
        location_id: impl Into<String>,
        area: impl Into<String>,
        point: GeoPoint,
        blood_group: BloodGroup,
        available_for_donation: bool,
    ) -> AppResult<Self> {
        let geohash = geohash::encode(point.latitude, point.longitude, geohash::DEFAULT_PRECISION)
            .ok_or_else(|| {
                AppError::validation(format!(
                    "invalid coordinates ({}, {})",
                    point.latitude, point.longitude
                ))
            })?;

        Ok(Self {
            donor_id: donor_id.into(),
            location_id: location_id.into(),
            area: area.into(),
            latitude: point.latitude,
            longitude: point.longitude,
            geohash,
            blood_group,
            available_for_donation,
            last_vaccinated_date: None,
        })
    }

    pub fn with_last_vaccinated_date(mut self, date: NaiveDate) -> Self {
        self.last_vaccinated_date = Some(date);
        self
    }

    pub fn reference(&self) -> DonorReference {
        DonorReference {
            user_id: self.donor_id.clone(),
            location_id: self.location_id.clone(),
        }
    }
}

/// Minimal projection of a location kept in groups and the cache
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorReference {
    pub user_id: String,
    pub location_id: String,
}

/// A location row as persisted by the location store
///
/// `gsi1pk` carries the partition (area, geohash partition, blood group,
/// availability) and `gsi1sk` the full geohash, which is what range queries
/// match prefixes against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct LocationRecord {
    pub pk: String,
    pub sk: String,
    pub gsi1pk: String,
    pub gsi1sk: String,
    #[serde(rename = "latitude")]
    pub latitude: f64,
    #[serde(rename = "longitude")]
    pub longitude: f64,
    #[serde(rename = "lastVaccinatedDate", default)]
    pub last_vaccinated_date: Option<NaiveDate>,
}

impl LocationRecord {
    pub fn from_location(location: &DonorLocation) -> Self {
        Self {
            pk: format!("{USER_KEY_PREFIX}{}", location.donor_id),
            sk: format!("{LOCATION_KEY_PREFIX}{}", location.location_id),
            gsi1pk: partition_key(
                &location.area,
                geohash::truncate(&location.geohash, GEO_PARTITION_PREFIX_LENGTH),
                location.blood_group,
                location.available_for_donation,
            ),
            gsi1sk: location.geohash.clone(),
            latitude: location.latitude,
            longitude: location.longitude,
            last_vaccinated_date: location.last_vaccinated_date,
        }
    }
}

/// Partition key for a (area, geohash partition, blood group, availability) bucket
pub fn partition_key(
    area: &str,
    geo_partition: &str,
    blood_group: BloodGroup,
    available_for_donation: bool,
) -> String {
    format!(
        "{LOCATION_KEY_PREFIX}{area}-{geo_partition}#BG#{blood_group}#DONATIONSTATUS#{available_for_donation}"
    )
}

/// Components of a partition key, borrowed from the key string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionKeyParts<'a> {
    pub area: &'a str,
    pub geo_partition: &'a str,
    pub blood_group: &'a str,
    pub available_for_donation: bool,
}

/// Split a partition key into its components
///
/// The area is everything up to the last `-` before the geohash partition,
/// so hyphenated areas such as `BD-DHK` come back whole.
pub fn parse_partition_key(key: &str) -> Option<PartitionKeyParts<'_>> {
    let captures = LOCATION_INDEX_KEY.as_ref()?.captures(key)?;
    Some(PartitionKeyParts {
        area: captures.get(1)?.as_str(),
        geo_partition: captures.get(2)?.as_str(),
        blood_group: captures.get(3)?.as_str(),
        available_for_donation: captures.get(4)?.as_str() == "true",
    })
}

impl TryFrom<LocationRecord> for DonorLocation {
    type Error = RepositoryError;

    fn try_from(record: LocationRecord) -> Result<Self, Self::Error> {
        let donor_id = record
            .pk
            .strip_prefix(USER_KEY_PREFIX)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RepositoryError::invalid_record("PK", record.pk.clone()))?;
        let location_id = record
            .sk
            .strip_prefix(LOCATION_KEY_PREFIX)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RepositoryError::invalid_record("SK", record.sk.clone()))?;

        let parts = parse_partition_key(&record.gsi1pk)
            .ok_or_else(|| RepositoryError::invalid_record("GSI1PK", "GSI1PK format is invalid"))?;
        let area = parts.area.to_string();
        let blood_group: BloodGroup = parts.blood_group.parse().map_err(|_| {
            RepositoryError::invalid_record(
                "GSI1PK",
                format!("unknown blood group '{}'", parts.blood_group),
            )
        })?;
        let available_for_donation = parts.available_for_donation;

        Ok(Self {
            donor_id: donor_id.to_string(),
            location_id: location_id.to_string(),
            area,
            latitude: record.latitude,
            longitude: record.longitude,
            geohash: record.gsi1sk,
            blood_group,
            available_for_donation,
            last_vaccinated_date: record.last_vaccinated_date,
        })
    }
}
