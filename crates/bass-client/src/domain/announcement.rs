//! # Announcement Parsing
//!
//! Just enough of the LE Audio advertising formats to coordinate sources:
//! the broadcast id and public-broadcast data from the extended advertising
//! report, and the BASE from periodic advertising reports.
//!
//! ```text
//! AD structure:   [len][type][data ...]          len covers type + data
//! Service data:   type 0x16, data = [uuid lo][uuid hi][payload ...]
//! BASE payload:   [delay:3][n_subgroups:1] { [n_bis:1][codec:5]
//!                 [cc_len:1][cc][meta_len:1][meta] { [bis:1][cc_len:1][cc] } }
//! ```

use le_audio_types::{BaseChannel, BaseData, BaseSubgroup, BroadcastId, PublicBroadcastData};

/// Broadcast Audio Announcement service (carries the broadcast id).
pub const BROADCAST_AUDIO_ANNOUNCEMENT_UUID: u16 = 0x1852;

/// Basic Audio Announcement service (carries the BASE).
pub const BASIC_AUDIO_ANNOUNCEMENT_UUID: u16 = 0x1851;

/// Public Broadcast Announcement service.
pub const PUBLIC_BROADCAST_ANNOUNCEMENT_UUID: u16 = 0x1856;

const AD_TYPE_SERVICE_DATA_16: u8 = 0x16;
const AD_TYPE_BROADCAST_NAME: u8 = 0x30;

const PBP_FEATURE_ENCRYPTED: u8 = 0x01;
const PBP_FEATURE_STANDARD_QUALITY: u8 = 0x02;
const PBP_FEATURE_HIGH_QUALITY: u8 = 0x04;

/// Iterate the AD structures of an advertising payload. Iteration stops at
/// a zero length (padding) or a truncated structure.
pub fn ad_structures(data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut rest = data;
    std::iter::from_fn(move || {
        let (&len, tail) = rest.split_first()?;
        let len = usize::from(len);
        if len == 0 || tail.len() < len {
            return None;
        }
        let (structure, next) = tail.split_at(len);
        rest = next;
        structure.split_first().map(|(&ad_type, body)| (ad_type, body))
    })
}

/// Payload of the 16-bit service data structure for `uuid`.
#[must_use]
pub fn service_data(data: &[u8], uuid: u16) -> Option<&[u8]> {
    ad_structures(data)
        .filter(|(ad_type, _)| *ad_type == AD_TYPE_SERVICE_DATA_16)
        .find_map(|(_, body)| {
            let (id, payload) = body.split_at_checked(2)?;
            (u16::from_le_bytes([id[0], id[1]]) == uuid).then_some(payload)
        })
}

/// Coordination-relevant contents of an extended advertising report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub broadcast_id: BroadcastId,
    pub public_broadcast: Option<PublicBroadcastData>,
    pub broadcast_name: Option<String>,
}

impl Announcement {
    /// `None` unless the report carries a valid broadcast id.
    #[must_use]
    pub fn parse(advertising_data: &[u8]) -> Option<Self> {
        let id_bytes = service_data(advertising_data, BROADCAST_AUDIO_ANNOUNCEMENT_UUID)?;
        let broadcast_id = match id_bytes {
            [a, b, c, ..] => BroadcastId::from_le_bytes([*a, *b, *c]),
            _ => return None,
        };

        let public_broadcast =
            service_data(advertising_data, PUBLIC_BROADCAST_ANNOUNCEMENT_UUID)
                .and_then(parse_public_broadcast);

        let broadcast_name = ad_structures(advertising_data)
            .find(|(ad_type, _)| *ad_type == AD_TYPE_BROADCAST_NAME)
            .and_then(|(_, body)| std::str::from_utf8(body).ok())
            .map(str::to_string);

        Some(Self {
            broadcast_id,
            public_broadcast,
            broadcast_name,
        })
    }
}

/// Decode a Public Broadcast Announcement payload.
#[must_use]
pub fn parse_public_broadcast(payload: &[u8]) -> Option<PublicBroadcastData> {
    let mut reader = Reader::new(payload);
    let features = reader.u8()?;
    let metadata = reader.length_prefixed()?;
    Some(PublicBroadcastData {
        encrypted: features & PBP_FEATURE_ENCRYPTED != 0,
        standard_quality: features & PBP_FEATURE_STANDARD_QUALITY != 0,
        high_quality: features & PBP_FEATURE_HIGH_QUALITY != 0,
        metadata: metadata.to_vec(),
    })
}

/// Find and decode the BASE in a periodic advertising report.
#[must_use]
pub fn parse_base(periodic_data: &[u8]) -> Option<BaseData> {
    let payload = service_data(periodic_data, BASIC_AUDIO_ANNOUNCEMENT_UUID)?;
    decode_base(payload)
}

fn decode_base(payload: &[u8]) -> Option<BaseData> {
    let mut reader = Reader::new(payload);
    let delay = reader.take(3)?;
    let presentation_delay_micros =
        u32::from(delay[0]) | u32::from(delay[1]) << 8 | u32::from(delay[2]) << 16;

    let subgroup_count = reader.u8()?;
    if subgroup_count == 0 {
        return None;
    }

    let mut subgroups = Vec::with_capacity(usize::from(subgroup_count));
    for _ in 0..subgroup_count {
        let bis_count = reader.u8()?;
        if bis_count == 0 {
            return None;
        }
        let mut codec_id = [0u8; 5];
        codec_id.copy_from_slice(reader.take(5)?);
        let codec_config = reader.length_prefixed()?.to_vec();
        let metadata = reader.length_prefixed()?.to_vec();

        let mut channels = Vec::with_capacity(usize::from(bis_count));
        for _ in 0..bis_count {
            let bis_index = reader.u8()?;
            let codec_config = reader.length_prefixed()?.to_vec();
            channels.push(BaseChannel {
                bis_index,
                codec_config,
            });
        }

        subgroups.push(BaseSubgroup {
            codec_id,
            codec_config,
            metadata,
            channels,
        });
    }

    Some(BaseData {
        presentation_delay_micros,
        subgroups,
    })
}

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let (head, tail) = self.data.split_at_checked(n)?;
        self.data = tail;
        Some(head)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn length_prefixed(&mut self) -> Option<&'a [u8]> {
        let len = self.u8()?;
        self.take(usize::from(len))
    }
}

/// Builders for advertising payloads, shared with the service tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures {
    use super::*;

    /// Wrap a payload as 16-bit service data.
    pub fn service_data_ad(uuid: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![(payload.len() + 3) as u8, AD_TYPE_SERVICE_DATA_16];
        out.extend_from_slice(&uuid.to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    /// Extended advertising data announcing `broadcast_id`.
    pub fn broadcast_announcement(broadcast_id: u32) -> Vec<u8> {
        let bytes = broadcast_id.to_le_bytes();
        service_data_ad(BROADCAST_AUDIO_ANNOUNCEMENT_UUID, &bytes[..3])
    }

    /// Public Broadcast Announcement with the given feature bits.
    pub fn public_announcement(features: u8, metadata: &[u8]) -> Vec<u8> {
        let mut payload = vec![features, metadata.len() as u8];
        payload.extend_from_slice(metadata);
        service_data_ad(PUBLIC_BROADCAST_ANNOUNCEMENT_UUID, &payload)
    }

    /// Broadcast name AD structure.
    pub fn broadcast_name(name: &str) -> Vec<u8> {
        let mut out = vec![(name.len() + 1) as u8, AD_TYPE_BROADCAST_NAME];
        out.extend_from_slice(name.as_bytes());
        out
    }

    /// Periodic advertising data with a one-subgroup, two-channel BASE.
    pub fn stereo_base() -> Vec<u8> {
        let payload = [
            0x40, 0x9C, 0x00, // presentation delay 40000 us
            0x01, // one subgroup
            0x02, // two BIS
            0x06, 0x00, 0x00, 0x00, 0x00, // LC3
            0x03, 0x02, 0x01, 0x08, // codec config
            0x00, // no metadata
            0x01, 0x03, 0x02, 0x05, 0x01, // BIS 1, channel allocation
            0x02, 0x03, 0x02, 0x05, 0x02, // BIS 2
        ];
        service_data_ad(BASIC_AUDIO_ANNOUNCEMENT_UUID, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_broadcast_id_little_endian() {
        let data = broadcast_announcement(0x00AB_CDEF);
        let announcement = Announcement::parse(&data).unwrap();
        assert_eq!(announcement.broadcast_id.value(), 0x00AB_CDEF);
        assert!(announcement.public_broadcast.is_none());
        assert!(announcement.broadcast_name.is_none());
    }

    #[test]
    fn test_full_announcement() {
        let mut data = broadcast_announcement(7);
        data.extend(public_announcement(0x05, &[0x03, 0x02, 0x04, 0x00]));
        data.extend(broadcast_name("Gate 12"));

        let announcement = Announcement::parse(&data).unwrap();
        let public = announcement.public_broadcast.unwrap();
        assert!(public.encrypted);
        assert!(!public.standard_quality);
        assert!(public.high_quality);
        assert_eq!(public.metadata.len(), 4);
        assert_eq!(announcement.broadcast_name.as_deref(), Some("Gate 12"));
    }

    #[test]
    fn test_announcement_without_broadcast_service() {
        let data = service_data_ad(0x180F, &[0x64]);
        assert!(Announcement::parse(&data).is_none());
    }

    #[test]
    fn test_truncated_ad_structure_stops_iteration() {
        let mut data = broadcast_announcement(9);
        data.extend([0x09, AD_TYPE_BROADCAST_NAME, b'x']);
        assert_eq!(ad_structures(&data).count(), 1);
    }

    #[test]
    fn test_parse_stereo_base() {
        let base = parse_base(&stereo_base()).unwrap();
        assert_eq!(base.presentation_delay_micros, 40_000);
        assert_eq!(base.subgroups.len(), 1);
        assert_eq!(base.subgroups[0].codec_id[0], 0x06);
        assert_eq!(base.channel_count(), 2);
        assert_eq!(base.subgroups[0].channels[1].bis_index, 2);
    }

    #[test]
    fn test_base_rejects_garbage() {
        assert!(parse_base(&[0x02, 0x01, 0x00]).is_none());
        assert!(parse_base(&service_data_ad(BASIC_AUDIO_ANNOUNCEMENT_UUID, &[0x40, 0x9C])).is_none());
        assert!(parse_base(&service_data_ad(
            BASIC_AUDIO_ANNOUNCEMENT_UUID,
            &[0x40, 0x9C, 0x00, 0x00]
        ))
        .is_none());
    }
}
