//! DNS wire-format codec (RFC 1035) with optional EDNS0 padding
//! (RFC 8467) for the encrypted transports.

use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::opt::EdnsOption;
use hickory_proto::rr::{Name, RData, RecordType};
use netsonde_domain::NetError;
use std::net::IpAddr;

/// RFC 8467 recommends padding client queries to a multiple of 128
/// octets.
const PADDING_BLOCK_SIZE: usize = 128;

/// EDNS0 payload size advertised in queries. Large enough that
/// upstreams rarely truncate.
const EDNS_MAX_PAYLOAD: u16 = 4096;

/// Encodes a single-question query for `hostname`. When
/// `requires_padding` is set (DoT/DoH), the query carries an EDNS0
/// padding option sized so the final message is a multiple of 128
/// octets; UDP/TCP queries must pass `false`.
pub fn encode_query(
    hostname: &str,
    query_type: RecordType,
    requires_padding: bool,
) -> Result<Vec<u8>, NetError> {
    let name = Name::from_utf8(hostname)
        .map_err(|e| NetError::Other(format!("invalid query name {hostname}: {e}")))?;

    let mut message = Message::new();
    message.set_id(fastrand::u16(..));
    message.set_message_type(MessageType::Query);
    message.set_op_code(OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(Query::query(name, query_type));

    if !requires_padding {
        return message
            .to_vec()
            .map_err(|e| NetError::Other(format!("dns encode failed: {e}")));
    }

    // Serialize once with a zero-length padding option to learn the
    // unpadded size including the option header, then pad to the next
    // block boundary.
    let mut edns = Edns::new();
    edns.set_max_payload(EDNS_MAX_PAYLOAD);
    edns.set_version(0);
    edns.options_mut().insert(EdnsOption::Unknown(12, Vec::new()));
    message.set_edns(edns);

    let unpadded = message
        .to_vec()
        .map_err(|e| NetError::Other(format!("dns encode failed: {e}")))?;
    let pad_len = (PADDING_BLOCK_SIZE - unpadded.len() % PADDING_BLOCK_SIZE) % PADDING_BLOCK_SIZE;

    if pad_len > 0 {
        let mut edns = Edns::new();
        edns.set_max_payload(EDNS_MAX_PAYLOAD);
        edns.set_version(0);
        edns.options_mut()
            .insert(EdnsOption::Unknown(12, vec![0u8; pad_len]));
        message.set_edns(edns);
    }

    message
        .to_vec()
        .map_err(|e| NetError::Other(format!("dns encode failed: {e}")))
}

/// Decodes a reply into the addresses answering `query_type`. Records
/// of the other address family in the same reply are ignored rather
/// than mixed in. Negative responses map to the DNS failure sentinels;
/// a syntactically valid reply with zero matching answers is
/// [`NetError::DnsNoAnswer`].
pub fn decode_reply(query_type: RecordType, reply: &[u8]) -> Result<Vec<IpAddr>, NetError> {
    let message = Message::from_vec(reply).map_err(|e| NetError::DnsDecode(e.to_string()))?;

    match message.response_code() {
        ResponseCode::NoError => {}
        ResponseCode::NXDomain => return Err(NetError::DnsNxdomain),
        _ => return Err(NetError::DnsServerFailure),
    }

    let mut addresses = Vec::new();
    for record in message.answers() {
        match record.data() {
            Some(RData::A(a)) if query_type == RecordType::A => {
                addresses.push(IpAddr::V4(a.0));
            }
            Some(RData::AAAA(aaaa)) if query_type == RecordType::AAAA => {
                addresses.push(IpAddr::V6(aaaa.0));
            }
            _ => {}
        }
    }

    if addresses.is_empty() {
        return Err(NetError::DnsNoAnswer);
    }
    Ok(addresses)
}
