//! Parameter-set cache: the latest SPS, PPS, and IDR a device session has
//! produced, so a late-joining viewer can be primed without waiting for
//! the next keyframe interval.

use bytes::{Bytes, BytesMut};

use crate::nal::NalUnit;

#[derive(Debug, Default, Clone)]
pub struct ParamCache {
    sps: Option<Bytes>,
    pps: Option<Bytes>,
    idr: Option<Bytes>,
}

impl ParamCache {
    /// Overwrite the relevant slot if `nal` is an SPS/PPS/IDR; no-op
    /// otherwise. Called for every NAL a session ingests.
    pub fn observe(&mut self, nal: &NalUnit) {
        match nal.nal_type() {
            Some(7) => self.sps = Some(nal.data.clone()),
            Some(8) => self.pps = Some(nal.data.clone()),
            Some(5) => self.idr = Some(nal.data.clone()),
            _ => {}
        }
    }

    /// SPS ∥ PPS ∥ IDR concatenated into a single primer payload, each
    /// with its original start code. `None` until both SPS and PPS have
    /// been seen. The IDR is included when available but is not required
    /// to produce a primer.
    pub fn primer_payload(&self) -> Option<Bytes> {
        let sps = self.sps.as_ref()?;
        let pps = self.pps.as_ref()?;
        let mut buf = BytesMut::with_capacity(
            sps.len() + pps.len() + self.idr.as_ref().map_or(0, |i| i.len()),
        );
        buf.extend_from_slice(sps);
        buf.extend_from_slice(pps);
        if let Some(idr) = &self.idr {
            buf.extend_from_slice(idr);
        }
        Some(buf.freeze())
    }

    /// Discarded whenever RUNNING is exited; fresh SPS/PPS will arrive on
    /// the restarted stream.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nal(bytes: &[u8]) -> NalUnit {
        NalUnit {
            data: Bytes::copy_from_slice(bytes),
        }
    }

    #[test]
    fn no_primer_until_sps_and_pps_seen() {
        let mut cache = ParamCache::default();
        assert!(cache.primer_payload().is_none());
        cache.observe(&nal(&[0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x0A]));
        assert!(cache.primer_payload().is_none());
    }

    #[test]
    fn primer_is_sps_pps_idr_concatenated_in_order() {
        let sps = [0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x0A];
        let pps = [0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x38, 0x80];
        let idr = [0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00, 0x10];

        let mut cache = ParamCache::default();
        cache.observe(&nal(&sps));
        cache.observe(&nal(&pps));
        cache.observe(&nal(&idr));

        let mut expected = Vec::new();
        expected.extend_from_slice(&sps);
        expected.extend_from_slice(&pps);
        expected.extend_from_slice(&idr);

        assert_eq!(cache.primer_payload().unwrap().to_vec(), expected);
    }

    #[test]
    fn primer_available_without_idr() {
        let mut cache = ParamCache::default();
        cache.observe(&nal(&[0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x0A]));
        cache.observe(&nal(&[0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x38, 0x80]));
        assert!(cache.primer_payload().is_some());
    }

    #[test]
    fn clear_resets_all_slots() {
        let mut cache = ParamCache::default();
        cache.observe(&nal(&[0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x0A]));
        cache.observe(&nal(&[0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x38, 0x80]));
        cache.clear();
        assert!(cache.primer_payload().is_none());
    }
}
