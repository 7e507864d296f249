//! A reassembled (or outbound, pre-serialization) U2FHID message: a
//! `(CID, CMD, payload)` tuple backed by a single contiguous buffer rather
//! than the reference implementation's linked list of continuation parts.

use super::constants::{CONT_DATA_CAP, INIT_DATA_CAP};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub cid: u32,
    pub cmd: u8,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(cid: u32, cmd: u8, payload: Vec<u8>) -> Self {
        Message { cid, cmd, payload }
    }
}

/// Number of packets (1 init + N continuations) needed to carry `bcnt`
/// bytes of payload.
pub fn nb_packets(bcnt: usize) -> usize {
    let overflow = bcnt.saturating_sub(INIT_DATA_CAP);
    1 + overflow.div_ceil(CONT_DATA_CAP)
}

/// Maximum payload representable by `n` packets (1 init + (n-1) conts).
pub fn max_payload(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    INIT_DATA_CAP + (n - 1) * CONT_DATA_CAP
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_packet_fits_in_init() {
        assert_eq!(nb_packets(0), 1);
        assert_eq!(nb_packets(INIT_DATA_CAP), 1);
    }

    #[test]
    fn one_byte_over_needs_a_continuation() {
        assert_eq!(nb_packets(INIT_DATA_CAP + 1), 2);
    }

    #[test]
    fn max_payload_matches_nb_packets_boundary() {
        for n in 1..5 {
            let cap = max_payload(n);
            assert_eq!(nb_packets(cap), n);
            assert_eq!(nb_packets(cap + 1), n + 1);
        }
    }
}
