//! Vendor mappers.
//!
//! Every scanning backend reports detections in its own shape: some use
//! proximity strings, some CoreLocation-style integer codes, some name the
//! signal strength `RSSI` instead of `rssi`, the geofence collaborator only
//! knows a region identifier, and the BlueZ backend hands over raw iBeacon
//! manufacturer data. The mappers here absorb those differences so the
//! scanner and everything downstream only ever see a [`Signal`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::region::{MonitoringDescriptor, RegionDescriptor};
use crate::types::{KnownBeacon, Proximity, Signal};

/// Errors raised while mapping a raw backend event.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    /// A proximity string outside the canonical vocabulary.
    #[error("unknown proximity '{0}'")]
    UnknownProximity(String),

    /// A proximity code the coded backends do not define.
    #[error("unknown proximity code {0}")]
    UnknownProximityCode(i32),

    /// A major/minor value that does not fit in 16 bits.
    #[error("{field} value {value} is out of range")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: i64,
    },

    /// A geofence identifier not of the form `beacon_id|UUID|major|minor`.
    #[error("malformed geofence identifier '{0}'")]
    MalformedIdentifier(String),

    /// Manufacturer data that is not an iBeacon frame.
    #[error("not an iBeacon advertisement")]
    NotIBeacon,
}

/// Maps one backend's raw event type into the canonical [`Signal`].
pub trait SignalMapper {
    /// The raw event shape this mapper understands.
    type Raw;

    /// Normalize a raw event.
    ///
    /// # Errors
    ///
    /// Returns a [`MapError`] when the event does not describe a beacon.
    fn map(&self, raw: &Self::Raw) -> Result<Signal, MapError>;
}

fn to_u16(field: &'static str, value: i64) -> Result<u16, MapError> {
    u16::try_from(value).map_err(|_| MapError::OutOfRange { field, value })
}

// ============================================================================
// String-vocabulary backends
// ============================================================================

/// A ranged beacon as reported by backends that spell proximity as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangedBeacon {
    /// Proximity UUID in any case.
    pub uuid: String,
    /// Major identifier.
    pub major: i64,
    /// Minor identifier.
    pub minor: i64,
    /// Signal strength, when reported.
    #[serde(default)]
    pub rssi: Option<i32>,
    /// Distance estimate in meters.
    #[serde(default)]
    pub accuracy: f64,
    /// One of `unknown`, `far`, `near`, `immediate`.
    pub proximity: String,
}

/// Mapper for [`RangedBeacon`] events.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringProximityMapper;

impl SignalMapper for StringProximityMapper {
    type Raw = RangedBeacon;

    fn map(&self, raw: &RangedBeacon) -> Result<Signal, MapError> {
        Ok(Signal {
            uuid: raw.uuid.to_uppercase(),
            major: to_u16("major", raw.major)?,
            minor: to_u16("minor", raw.minor)?,
            rssi: raw.rssi,
            accuracy: raw.accuracy,
            proximity: raw.proximity.parse()?,
        })
    }
}

// ============================================================================
// Coded backends
// ============================================================================

/// Proximity codes used by CoreLocation-style backends.
pub mod proximity_code {
    /// Distance could not be determined.
    pub const UNKNOWN: i32 = 0;
    /// Immediate vicinity.
    pub const IMMEDIATE: i32 = 1;
    /// Relatively close.
    pub const NEAR: i32 = 2;
    /// Further away.
    pub const FAR: i32 = 3;
}

/// A ranged beacon from a backend using integer proximity codes and an
/// upper-case `RSSI` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodedBeacon {
    /// Proximity UUID in any case.
    #[serde(rename = "UUID")]
    pub uuid: String,
    /// Major identifier.
    pub major: i64,
    /// Minor identifier.
    pub minor: i64,
    /// Signal strength, when reported.
    #[serde(rename = "RSSI", default)]
    pub rssi: Option<i32>,
    /// Distance estimate in meters.
    #[serde(default)]
    pub accuracy: f64,
    /// One of the [`proximity_code`] constants.
    pub proximity: i32,
}

/// Mapper for [`CodedBeacon`] events.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodedProximityMapper;

impl CodedProximityMapper {
    fn proximity(code: i32) -> Result<Proximity, MapError> {
        match code {
            proximity_code::UNKNOWN => Ok(Proximity::Unknown),
            proximity_code::IMMEDIATE => Ok(Proximity::Immediate),
            proximity_code::NEAR => Ok(Proximity::Near),
            proximity_code::FAR => Ok(Proximity::Far),
            other => Err(MapError::UnknownProximityCode(other)),
        }
    }
}

impl SignalMapper for CodedProximityMapper {
    type Raw = CodedBeacon;

    fn map(&self, raw: &CodedBeacon) -> Result<Signal, MapError> {
        Ok(Signal {
            uuid: raw.uuid.to_uppercase(),
            major: to_u16("major", raw.major)?,
            minor: to_u16("minor", raw.minor)?,
            rssi: raw.rssi,
            accuracy: raw.accuracy,
            proximity: Self::proximity(raw.proximity)?,
        })
    }
}

// ============================================================================
// Geofence entries
// ============================================================================

static GEOFENCE_IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\|([^|]+)\|(\d+)\|(\d+)$").expect("geofence identifier pattern is valid")
});

/// A geofence region entered by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeofenceEntry {
    /// Region identifier, `beacon_id|UUID|major|minor`.
    pub identifier: String,
}

/// Build the identifier a geofence region is registered under.
#[must_use]
pub fn geofence_identifier(beacon: &KnownBeacon) -> String {
    format!(
        "{}|{}|{}|{}",
        beacon.beacon_id, beacon.uuid, beacon.major, beacon.minor
    )
}

/// Mapper for [`GeofenceEntry`] events.
///
/// Geofence hits carry no radio measurement, so the signal gets an RSSI and
/// accuracy of `-1` and an unknown proximity.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeofenceMapper;

impl SignalMapper for GeofenceMapper {
    type Raw = GeofenceEntry;

    fn map(&self, raw: &GeofenceEntry) -> Result<Signal, MapError> {
        let caps = GEOFENCE_IDENTIFIER
            .captures(raw.identifier.trim())
            .ok_or_else(|| MapError::MalformedIdentifier(raw.identifier.clone()))?;
        let number = |idx: usize, field: &'static str| -> Result<u16, MapError> {
            let text = &caps[idx];
            let value: i64 = text
                .parse()
                .map_err(|_| MapError::MalformedIdentifier(raw.identifier.clone()))?;
            to_u16(field, value)
        };

        Ok(Signal {
            uuid: caps[2].to_uppercase(),
            major: number(3, "major")?,
            minor: number(4, "minor")?,
            rssi: Some(-1),
            accuracy: -1.0,
            proximity: Proximity::Unknown,
        })
    }
}

// ============================================================================
// iBeacon advertisements
// ============================================================================

/// Bluetooth SIG company identifier carried by iBeacon frames.
pub const APPLE_COMPANY_ID: u16 = 0x004C;

const IBEACON_TYPE: u8 = 0x02;
const IBEACON_LENGTH: u8 = 0x15;
const IMMEDIATE_LIMIT_M: f64 = 0.5;
const NEAR_LIMIT_M: f64 = 3.0;

/// Manufacturer data observed in a BLE advertisement, minus the company id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IBeaconAdvertisement {
    /// Manufacturer-specific payload.
    pub payload: Vec<u8>,
    /// Signal strength of the advertisement.
    pub rssi: Option<i16>,
}

/// The decoded fields of an iBeacon frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IBeaconFrame {
    /// Upper-case hyphenated proximity UUID.
    pub uuid: String,
    /// Major identifier.
    pub major: u16,
    /// Minor identifier.
    pub minor: u16,
    /// Calibrated RSSI at one meter.
    pub tx_power: i8,
}

impl IBeaconAdvertisement {
    /// Decode the iBeacon frame.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::NotIBeacon`] if the payload is not an iBeacon frame.
    pub fn frame(&self) -> Result<IBeaconFrame, MapError> {
        let p = &self.payload;
        if p.len() < 23 || p[0] != IBEACON_TYPE || p[1] != IBEACON_LENGTH {
            return Err(MapError::NotIBeacon);
        }
        let uuid = uuid::Uuid::from_slice(&p[2..18]).map_err(|_| MapError::NotIBeacon)?;
        Ok(IBeaconFrame {
            uuid: uuid.hyphenated().to_string().to_uppercase(),
            major: u16::from_be_bytes([p[18], p[19]]),
            minor: u16::from_be_bytes([p[20], p[21]]),
            tx_power: i8::from_be_bytes([p[22]]),
        })
    }
}

/// Estimate the distance in meters from a measured RSSI and the calibrated
/// one-meter power. Returns `-1.0` when no estimate is possible.
#[must_use]
pub fn estimate_accuracy(tx_power: i8, rssi: i16) -> f64 {
    if rssi == 0 || tx_power == 0 {
        return -1.0;
    }
    let ratio = f64::from(rssi) / f64::from(tx_power);
    if ratio < 1.0 {
        ratio.powf(10.0)
    } else {
        0.899_76f64.mul_add(ratio.powf(7.7095), 0.111)
    }
}

/// Bucket a distance estimate.
#[must_use]
pub fn proximity_for_accuracy(accuracy: f64) -> Proximity {
    if accuracy < 0.0 {
        Proximity::Unknown
    } else if accuracy < IMMEDIATE_LIMIT_M {
        Proximity::Immediate
    } else if accuracy < NEAR_LIMIT_M {
        Proximity::Near
    } else {
        Proximity::Far
    }
}

/// Mapper for [`IBeaconAdvertisement`] events.
#[derive(Debug, Clone, Copy, Default)]
pub struct IBeaconMapper;

impl SignalMapper for IBeaconMapper {
    type Raw = IBeaconAdvertisement;

    fn map(&self, raw: &IBeaconAdvertisement) -> Result<Signal, MapError> {
        let frame = raw.frame()?;
        let accuracy = raw
            .rssi
            .map_or(-1.0, |rssi| estimate_accuracy(frame.tx_power, rssi));
        Ok(Signal {
            uuid: frame.uuid,
            major: frame.major,
            minor: frame.minor,
            rssi: raw.rssi.map(i32::from),
            accuracy,
            proximity: proximity_for_accuracy(accuracy),
        })
    }
}

// ============================================================================
// Backend events
// ============================================================================

/// A raw detection as it leaves a backend or the geofence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawBeaconEvent {
    /// String-proximity ranging result.
    Ranged(RangedBeacon),
    /// Coded-proximity ranging result.
    Coded(CodedBeacon),
    /// Raw iBeacon advertisement.
    Advertisement(IBeaconAdvertisement),
    /// Geofence region entered.
    GeofenceEntered(GeofenceEntry),
}

impl RawBeaconEvent {
    /// Run the vendor mapper matching this event's shape.
    ///
    /// # Errors
    ///
    /// Propagates the mapper's [`MapError`].
    pub fn to_signal(&self) -> Result<Signal, MapError> {
        match self {
            Self::Ranged(raw) => StringProximityMapper.map(raw),
            Self::Coded(raw) => CodedProximityMapper.map(raw),
            Self::Advertisement(raw) => IBeaconMapper.map(raw),
            Self::GeofenceEntered(raw) => GeofenceMapper.map(raw),
        }
    }
}

// ============================================================================
// Region mapping
// ============================================================================

/// The region a known beacon is tracked under in the region registry.
#[must_use]
pub fn region_descriptor(beacon: &KnownBeacon) -> RegionDescriptor {
    RegionDescriptor {
        uuid: beacon.uuid.to_uppercase(),
        identifier: beacon.beacon_id.to_string(),
    }
}

/// The monitor request a backend receives for a known beacon.
#[must_use]
pub fn monitoring_descriptor(beacon: &KnownBeacon) -> MonitoringDescriptor {
    MonitoringDescriptor {
        region: region_descriptor(beacon),
        notify_on_entry: true,
        notify_on_exit: true,
    }
}
