use std::net::Ipv4Addr;

use proptest::prelude::*;

use dhcplet::packet::{ReplyKind, encode_reply};
use dhcplet::{DhcpMessage, MessageType, ServerContext};

const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
const DHCP_FIXED_HEADER_SIZE: usize = 240;

fn valid_header() -> Vec<u8> {
    let mut packet = vec![0u8; DHCP_FIXED_HEADER_SIZE];
    packet[0] = 1;
    packet[1] = 1;
    packet[2] = 6;
    packet[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);
    packet
}

fn test_context() -> ServerContext {
    ServerContext {
        server_ip: Ipv4Addr::new(192, 168, 1, 1),
        netmask: Ipv4Addr::new(255, 255, 255, 0),
        gateway: Ipv4Addr::new(192, 168, 1, 1),
        broadcast: Ipv4Addr::new(192, 168, 1, 255),
        dns1: Ipv4Addr::new(8, 8, 8, 8),
        dns2: Some(Ipv4Addr::new(8, 8, 4, 4)),
        lease_secs: 86400,
        renewal_secs: 43200,
        rebinding_secs: 75600,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10000))]

    #[test]
    fn decode_never_panics_on_arbitrary_bytes(data: Vec<u8>) {
        let _ = DhcpMessage::decode(&data);
    }

    #[test]
    fn decode_never_panics_on_valid_header_with_random_options(
        options_data in prop::collection::vec(any::<u8>(), 0..512)
    ) {
        let mut packet = valid_header();
        packet.extend_from_slice(&options_data);
        let _ = DhcpMessage::decode(&packet);
    }

    #[test]
    fn decode_never_panics_on_corrupted_header(
        corrupted_bytes in prop::collection::vec(any::<u8>(), 240..600),
        corruption_indices in prop::collection::vec(0usize..240, 1..10),
        corruption_values in prop::collection::vec(any::<u8>(), 1..10)
    ) {
        let mut packet = corrupted_bytes;
        if packet.len() >= 240 {
            packet[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);
        }
        for (index, value) in corruption_indices.iter().zip(corruption_values.iter()) {
            if *index < packet.len() {
                packet[*index] = *value;
            }
        }
        let _ = DhcpMessage::decode(&packet);
    }

    #[test]
    fn decode_never_panics_on_random_option_lengths(
        option_code in 1u8..254,
        option_length in any::<u8>(),
        option_data in prop::collection::vec(any::<u8>(), 0..256)
    ) {
        let mut packet = valid_header();
        packet.push(option_code);
        packet.push(option_length);
        let actual_len = (option_length as usize).min(option_data.len());
        packet.extend_from_slice(&option_data[..actual_len]);
        packet.push(255);
        let _ = DhcpMessage::decode(&packet);
    }

    #[test]
    fn decode_never_panics_on_nested_overload(
        overload_flag in 1u8..=3,
        sname_data in prop::collection::vec(any::<u8>(), 64..=64),
        file_data in prop::collection::vec(any::<u8>(), 128..=128)
    ) {
        let mut packet = valid_header();
        packet[44..108].copy_from_slice(&sname_data);
        packet[108..236].copy_from_slice(&file_data);
        packet.push(52);
        packet.push(1);
        packet.push(overload_flag);
        packet.push(255);
        let _ = DhcpMessage::decode(&packet);
    }

    #[test]
    fn replies_echo_request_identity(
        xid in any::<u32>(),
        secs in any::<u16>(),
        flags in any::<u16>(),
        chaddr in any::<[u8; 16]>(),
        reply_ip in any::<[u8; 4]>(),
    ) {
        let mut packet = valid_header();
        packet[4..8].copy_from_slice(&xid.to_be_bytes());
        packet[8..10].copy_from_slice(&secs.to_be_bytes());
        packet[10..12].copy_from_slice(&flags.to_be_bytes());
        packet[28..44].copy_from_slice(&chaddr);
        packet.push(255);

        let request = DhcpMessage::decode(&packet).unwrap();
        let reply_ip = Ipv4Addr::from(reply_ip);
        let encoded = encode_reply(
            MessageType::Offer,
            reply_ip,
            &request,
            &test_context(),
            ReplyKind::Lease,
        );
        let reply = DhcpMessage::decode(&encoded).unwrap();

        prop_assert_eq!(reply.op, 2);
        prop_assert_eq!(reply.xid, xid);
        prop_assert_eq!(reply.secs, secs);
        prop_assert_eq!(reply.flags, flags);
        prop_assert_eq!(reply.chaddr, chaddr);
        prop_assert_eq!(reply.yiaddr, reply_ip);
        prop_assert_eq!(reply.ciaddr, Ipv4Addr::UNSPECIFIED);
        prop_assert_eq!(reply.message_type(), Some(MessageType::Offer));
    }

    #[test]
    fn replies_always_at_least_300_bytes(
        xid in any::<u32>(),
        kind in prop::bool::ANY,
    ) {
        let mut packet = valid_header();
        packet[4..8].copy_from_slice(&xid.to_be_bytes());
        packet.push(255);

        let request = DhcpMessage::decode(&packet).unwrap();
        let kind = if kind { ReplyKind::Lease } else { ReplyKind::InfoOnly };
        let encoded = encode_reply(
            MessageType::Ack,
            Ipv4Addr::UNSPECIFIED,
            &request,
            &test_context(),
            kind,
        );
        prop_assert!(encoded.len() >= 300);
    }

    #[test]
    fn short_datagrams_always_rejected(
        data in prop::collection::vec(any::<u8>(), 0..240)
    ) {
        let result = DhcpMessage::decode(&data);
        prop_assert!(result.is_err());
    }

    #[test]
    fn bad_magic_cookie_always_rejected(
        cookie in any::<[u8; 4]>()
    ) {
        prop_assume!(cookie != DHCP_MAGIC_COOKIE);

        let mut packet = valid_header();
        packet[236..240].copy_from_slice(&cookie);
        packet.push(255);

        let result = DhcpMessage::decode(&packet);
        prop_assert!(result.is_err());
    }

    #[test]
    fn declared_length_past_buffer_always_rejected(
        option_code in 1u8..=49,
        shortfall in 1usize..=32,
        declared in 33u8..=255,
    ) {
        let mut packet = valid_header();
        packet.push(option_code);
        packet.push(declared);
        // Fewer value bytes than declared, and no end marker after.
        packet.extend(std::iter::repeat_n(0u8, declared as usize - shortfall));

        let result = DhcpMessage::decode(&packet);
        prop_assert!(result.is_err());
    }
}
