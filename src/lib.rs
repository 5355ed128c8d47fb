// PAWL
//
// A rust implementation of a TACACS+ Protocol "client"
// as defined by RFC8907 and related.
//
// (C) 2025 - T.J. Hampton
//

use std::fmt;

use flex_alloc_secure::{alloc::SecureAlloc, boxed::ProtectedBox, flex_alloc, ExposeProtected};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

const TACP_HEADER_MAX_LENGTH: usize = 12; // 12 bytes.

/// This macro generates a fn, from_byte for
///  - a given u8-enum type, and
///  - list of applicable variants.
macro_rules! impl_from_byte {
    ($enum_name:ident $(,$variant:ident)+) => {
        impl $enum_name {
            pub const fn from_byte(value: u8) -> Result<Self, &'static str> {
                match value {
                    $(
                        x if x == $enum_name::$variant as u8 => Ok($enum_name::$variant),
                    )+
                    _ => Err(concat!("Invalid byte value processing for: ", stringify!($enum_name))),
                }
            }
        }
    };
}

/// This macro generates a fn, from_byte for
///  - a given u8-enum type, and
///  - list of applicable variants.
macro_rules! impl_global_consts {
    ($enum_name:ident $(,$variant:ident)+) => {
        $(
            const $variant: u8 = ($enum_name::$variant as u8);
        )+
    };
}

/// This represents the TACACS+ Header
#[derive(Debug)]
pub struct PLHeader {
    pub tacp_hdr_version: PLTACVersion,
    pub tacp_hdr_type: PLTACType,
    pub tacp_hdr_seqno: u8, // 1-255, always tx odd rx even, session ends if a wrap occurs
    pub tacp_hdr_flags: u8,
    pub tacp_hdr_sesid: u32, // must be CSPRNG
    pub tacp_hdr_length: u32,
}

impl PLHeader {
    /// This prepares to stream a header
    pub fn serialize(&self) -> Vec<u8> {
        let mut result = vec![
            self.tacp_hdr_version.clone() as u8,
            self.tacp_hdr_type.clone() as u8,
            self.tacp_hdr_seqno,
            self.tacp_hdr_flags,
        ];

        result.extend(&self.tacp_hdr_sesid.to_be_bytes());
        result.extend(&self.tacp_hdr_length.to_be_bytes());

        result
    }

    /// For a given session number, and pre-prepared request body, this
    /// generates a header with appropriate metadata.
    pub fn get_request_header(ses: u32, t: PLTACType, body: &[u8], cur_seq: u8, version: u8) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let lt = body.len() as u32;
        let seq_no = cur_seq + 1;
        Self {
            tacp_hdr_version: PLTACVersion::from_byte(version)
                .expect("We only emit valid versions"),
            tacp_hdr_type: t,
            tacp_hdr_seqno: seq_no,
            tacp_hdr_flags: 0,
            tacp_hdr_sesid: ses,
            tacp_hdr_length: lt,
        }
    }

    /// Reconstruct a header from the leading bytes of a segment.
    ///
    /// The header is always cleartext, the caller learns the body
    /// length from the result. Exactly 12 bytes are interpreted,
    /// anything beyond that is the body and is not touched here.
    ///
    #[allow(clippy::indexing_slicing)]
    pub fn from_bytes(hdr_buf: &[u8]) -> Result<Self, &'static str> {
        if hdr_buf.len() < 4 {
            return Err("Unable to extract data from header. Likely the TACACS+ key does not match between server and client");
        }

        Ok(Self {
            tacp_hdr_version: PLTACVersion::from_byte(hdr_buf[0])?,
            tacp_hdr_type: PLTACType::from_byte(hdr_buf[1])?,
            tacp_hdr_seqno: hdr_buf[2],
            tacp_hdr_flags: hdr_buf[3],
            tacp_hdr_sesid: read_be_u32(&mut hdr_buf.get(4..8).unwrap_or(&[]))
                .map_or(Err("read_be_u32 can only process 4-slices"), Ok)?,
            tacp_hdr_length: read_be_u32(&mut hdr_buf.get(8..12).unwrap_or(&[]))
                .map_or(Err("read_be_u32 can only process 4-slices"), Ok)?,
        })
    }

    pub fn get_version_major(&self) -> u8 {
        (self.tacp_hdr_version.clone() as u8) >> 4
    }

    pub fn get_version_minor(&self) -> u8 {
        (self.tacp_hdr_version.clone() as u8) & 0xF
    }

    /// Implements infallible cast, commonly needed
    pub fn get_expected_packet_length(&self) -> usize {
        self.tacp_hdr_length.try_into().unwrap_or_default()
    }

    /// This pulls a reply header off the TCP stream
    ///
    /// This prevents pawl from processing very large
    /// messages, as required by RFC8907
    ///
    pub async fn parse_reply_header(stream: &mut TcpStream, cur_seq: u8) -> Result<Self, &'static str> {
        let mut hdr_buf: [u8; TACP_HEADER_MAX_LENGTH] = [0u8; TACP_HEADER_MAX_LENGTH];
        let exp_seq = cur_seq + 1;

        match stream.read_exact(&mut hdr_buf).await {
            Ok(_) => (),
            Err(e) => {
                return Err("Segment too short, check server implementation.");
            }
        }

        let ret = Self::from_bytes(&hdr_buf)?;

        if ret.tacp_hdr_seqno != exp_seq {
            return Err("Invalid reply sequence number");
        }

        match ret.tacp_hdr_flags {
            TAC_PLUS_NULL_FLAG => (),
            _ => return Err("Single-session Mode Not Implemented, must be encrypted."),
        }

        if ret.tacp_hdr_length > 65535 {
            return Err("Server wants to send unreasonably large message or something");
        }

        Ok(ret)
    }

    /// This pulls the reply packet off the TCP stream
    ///
    /// It performs the decryption specified in the RFC.
    ///
    pub async fn parse_reply_packet(
        &self,
        stream: &mut TcpStream,
        key: &ProtectedBox<flex_alloc::vec::Vec<u8, SecureAlloc>>,
    ) -> Result<PLAuthenReplyPacket, &'static str> {
        let mut pck_buf = vec![0u8; self.get_expected_packet_length()];
        match stream.read_exact(&mut pck_buf).await {
            Ok(_) => (),
            Err(e) => {
                return Err("Segment too short, check server implementation.");
            }
        }

        let mut pck_clear = vec![];
        key.expose_read(|inner_key| {
            let md5pad = self.compute_md5_pad(&inner_key.iter().map(|z| *z).collect::<Vec<u8>>());
            pck_clear = md5_xor(&pck_buf, &md5pad);
        });

        match PLAuthenReplyPacket::from_raw_packet(&pck_clear) {
            Ok(r) => Ok(r),
            Err(e) => Err("Packet field error in authentication."),
        }
    }

    /// Generate the pad and truncate it to length
    ///
    /// This seems to work for the implementations checked.
    ///
    pub fn compute_md5_pad(&self, inner_key: &[u8]) -> Vec<u8> {
        let payload_length = self.get_expected_packet_length();
        let mut md5ctx = md5::Context::new();

        md5ctx.consume(self.tacp_hdr_sesid.to_be_bytes());
        md5ctx.consume(inner_key);
        md5ctx.consume([self.tacp_hdr_version.clone() as u8]);
        md5ctx.consume(self.tacp_hdr_seqno.to_be_bytes());

        let mut md5pad = md5ctx.compute().to_vec();
        let mut md5last = vec![];
        md5pad.clone_into(&mut md5last);

        while md5pad.len() < payload_length {
            let mut md5ctx = md5::Context::new();
            md5ctx.consume(self.tacp_hdr_sesid.to_be_bytes());
            md5ctx.consume(inner_key);
            md5ctx.consume([self.tacp_hdr_version.clone() as u8]);
            md5ctx.consume(self.tacp_hdr_seqno.to_be_bytes());
            md5ctx.consume(md5last.clone());

            md5last = md5ctx.compute().to_vec();
            md5pad.extend(&md5last);
        }

        md5pad.truncate(payload_length);

        md5pad
    }
}

#[derive(Debug, Clone)]
#[repr(u8)]
pub enum PLTACVersion {
    // Always prefix with TAC_PLUS_MAJOR_VER := 0xc
    TAC_PLUS_MINOR_VER_DEFAULT = 0xc0,
    TAC_PLUS_MINOR_VER_ONE = 0xc1,
}

impl_from_byte!(
    PLTACVersion,
    TAC_PLUS_MINOR_VER_DEFAULT,
    TAC_PLUS_MINOR_VER_ONE
);

impl_global_consts!(
    PLTACVersion,
    TAC_PLUS_MINOR_VER_DEFAULT,
    TAC_PLUS_MINOR_VER_ONE
);

#[derive(Debug, Clone)]
#[repr(u8)]
pub enum PLTACType {
    TAC_PLUS_AUTHEN = 0x01, //(Authentication)
    TAC_PLUS_AUTHOR = 0x02, //(Authorization)
    TAC_PLUS_ACCT = 0x03,   //(Accounting)
}
impl_from_byte!(PLTACType, TAC_PLUS_AUTHEN, TAC_PLUS_AUTHOR, TAC_PLUS_ACCT);

#[repr(u8)]
enum PLTACFlag {
    TAC_PLUS_NULL_FLAG = 0x00,        // This is actually a mask flag, define 0.
    TAC_PLUS_UNENCRYPTED_FLAG = 0x01, // Generate a warnings,
    TAC_PLUS_SINGLE_CONNECT_FLAG = 0x04, // different set of behaviors, TODO: Later. https://www.rfc-editor.org/rfc/rfc8907.html#name-single-connection-mode
}

impl_global_consts!(PLTACFlag, TAC_PLUS_NULL_FLAG);

/// One complete framed message: a header, the body bytes, and the
/// optional shared secret that obfuscates the body on the wire.
///
/// The body rides as given, cleartext when assembled for send, wire
/// bytes when pulled off the line. The XOR treatment is its own
/// inverse so one shape serves both directions.
///
#[derive(Debug)]
pub struct PLPacket<'a> {
    pub tacp_pkt_header: PLHeader,
    pub tacp_pkt_body: Vec<u8>,
    pub tacp_pkt_key: Option<&'a [u8]>,
}

impl<'a> PLPacket<'a> {
    pub fn from_parts(header: PLHeader, body: Vec<u8>, key: Option<&'a [u8]>) -> Self {
        Self {
            tacp_pkt_header: header,
            tacp_pkt_body: body,
            tacp_pkt_key: key,
        }
    }

    /// Reassemble a packet from a header's worth of bytes and the
    /// body bytes that followed it on the line.
    pub fn from_wire(hdr_buf: &[u8], body_buf: &[u8], key: Option<&'a [u8]>) -> Result<Self, &'static str> {
        let header = PLHeader::from_bytes(hdr_buf)?;

        if body_buf.len() < header.get_expected_packet_length() {
            return Err("Segment too short, check server implementation.");
        }

        if body_buf.len() > header.get_expected_packet_length() {
            return Err("Malformed packet size (doesn't add up)");
        }

        Ok(Self {
            tacp_pkt_header: header,
            tacp_pkt_body: body_buf.to_vec(),
            tacp_pkt_key: key,
        })
    }

    /// An unkeyed peering runs bodies in cleartext. Discouraged.
    pub fn is_encrypted(&self) -> bool {
        self.tacp_pkt_key.is_some()
    }

    /// The body as it crosses the wire, XORed against the pad
    /// whenever a key is configured.
    pub fn wire_body(&self) -> Vec<u8> {
        match self.tacp_pkt_key {
            Some(key) => md5_xor(
                &self.tacp_pkt_body,
                &self.tacp_pkt_header.compute_md5_pad(key),
            ),
            None => self.tacp_pkt_body.clone(),
        }
    }

    /// The body as the caller gets to read it. The pad treatment is
    /// an involution, so this is the same computation as wire_body.
    pub fn cleartext_body(&self) -> Vec<u8> {
        self.wire_body()
    }

    /// This prepares to stream the whole packet
    pub fn serialize(&self) -> Vec<u8> {
        let mut result = self.tacp_pkt_header.serialize();
        let mut payload = self.wire_body();
        result.append(&mut payload);

        result
    }
}

#[derive(Debug, Clone)]
#[repr(u8)]
pub enum PLAuthenPacketAction {
    TAC_PLUS_AUTHEN_LOGIN = 0x01,
    TAC_PLUS_AUTHEN_CHPASS = 0x02,
    TAC_PLUS_AUTHEN_SENDAUTH = 0x04,
}

#[derive(Debug, Clone)]
#[repr(u8)]
pub enum PLAuthenPacketType {
    TAC_PLUS_AUTHEN_TYPE_ASCII = 0x01,
    TAC_PLUS_AUTHEN_TYPE_PAP = 0x02,
    TAC_PLUS_AUTHEN_TYPE_CHAP = 0x03,
    TAC_PLUS_AUTHEN_TYPE_MSCHAP = 0x05,
    TAC_PLUS_AUTHEN_TYPE_MSCHAPV2 = 0x06,
}

#[derive(Debug, Clone)]
#[repr(u8)]
pub enum PLAuthenPacketService {
    TAC_PLUS_AUTHEN_SVC_NONE = 0x00,
    TAC_PLUS_AUTHEN_SVC_LOGIN = 0x01,
    TAC_PLUS_AUTHEN_SVC_ENABLE = 0x02,
    TAC_PLUS_AUTHEN_SVC_PPP = 0x03,
    TAC_PLUS_AUTHEN_SVC_PT = 0x05,
    TAC_PLUS_AUTHEN_SVC_RCMD = 0x06,
    TAC_PLUS_AUTHEN_SVC_X25 = 0x07,
    TAC_PLUS_AUTHEN_SVC_NASI = 0x08,
    TAC_PLUS_AUTHEN_SVC_FWPROXY = 0x09,
}

const TAC_PLUS_PRIV_LVL_USER: u8 = 0x01;

#[derive(Debug)]
pub struct PLAuthenStartPacket {
    action: PLAuthenPacketAction,
    priv_lvl: u8,
    pub authen_type: PLAuthenPacketType,
    authen_service: PLAuthenPacketService,
    user_len: u8,
    port_len: u8,
    rem_addr_len: u8,
    data_len: u8,
    pub user: Vec<u8>,
    port: Vec<u8>,
    rem_addr: Vec<u8>,
    pub data: Vec<u8>,
}

impl std::fmt::Display for PLAuthenStartPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PLAuthenStartPacket {{")?;
        writeln!(f, "    action: {:?},", self.action)?;
        writeln!(f, "    priv_lvl: {},", self.priv_lvl)?;
        writeln!(f, "    authen_type: {:?},", self.authen_type)?;
        writeln!(f, "    authen_service: {:?},", self.authen_service)?;
        writeln!(f, "    user_len: {},", self.user_len)?;
        writeln!(f, "    port_len: {},", self.port_len)?;
        writeln!(f, "    rem_addr_len: {},", self.rem_addr_len)?;
        writeln!(f, "    data_len: {},", self.data_len)?;
        writeln!(
            f,
            "    user: \"{:?}\",",
            String::from_utf8(self.user.clone())
        )?;
        writeln!(
            f,
            "    port: \"{:?}\",",
            String::from_utf8(self.port.clone())
        )?;
        writeln!(
            f,
            "    rem_addr: \"{:?}\",",
            String::from_utf8_lossy(&self.rem_addr.clone())
        )?;
        writeln!(
            f,
            "    data: \"MASKED USER PASSWORD\"," /* , String::from_utf8_lossy(&self.data.clone()) */
        )?;
        writeln!(f, "}}")
    }
}

/// This composes the opening packet of an authentication
/// conversation, which the client streams first.
///
/// - ASCII login MAY carry the username, the server asks for
///    whatever else it needs with GETUSER/GETPASS replies
/// - PAP forwards the whole credential pair at once, password
///    riding in the data field
///
impl PLAuthenStartPacket {
    pub fn get_ascii_login_packet(user: &[u8], port: &[u8], rem_addr: &[u8]) -> Result<Self, &'static str> {
        Self::assemble(
            PLAuthenPacketAction::TAC_PLUS_AUTHEN_LOGIN,
            TAC_PLUS_PRIV_LVL_USER,
            PLAuthenPacketType::TAC_PLUS_AUTHEN_TYPE_ASCII,
            PLAuthenPacketService::TAC_PLUS_AUTHEN_SVC_LOGIN,
            user,
            port,
            rem_addr,
            &[],
        )
    }

    pub fn get_pap_login_packet(
        user: &[u8],
        pass: &[u8],
        port: &[u8],
        rem_addr: &[u8],
    ) -> Result<Self, &'static str> {
        Self::assemble(
            PLAuthenPacketAction::TAC_PLUS_AUTHEN_LOGIN,
            TAC_PLUS_PRIV_LVL_USER,
            PLAuthenPacketType::TAC_PLUS_AUTHEN_TYPE_PAP,
            PLAuthenPacketService::TAC_PLUS_AUTHEN_SVC_LOGIN,
            user,
            port,
            rem_addr,
            pass,
        )
    }

    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::too_many_arguments)]
    fn assemble(
        action: PLAuthenPacketAction,
        priv_lvl: u8,
        authen_type: PLAuthenPacketType,
        authen_service: PLAuthenPacketService,
        user: &[u8],
        port: &[u8],
        rem_addr: &[u8],
        data: &[u8],
    ) -> Result<Self, &'static str> {
        if user.len() > 255 || port.len() > 255 || rem_addr.len() > 255 || data.len() > 255 {
            return Err("Authentication fields must each fit in one length byte");
        }

        Ok(Self {
            action,
            priv_lvl,
            authen_type,
            authen_service,
            user_len: user.len() as u8,
            port_len: port.len() as u8,
            rem_addr_len: rem_addr.len() as u8,
            data_len: data.len() as u8,
            user: user.to_vec(),
            port: port.to_vec(),
            rem_addr: rem_addr.to_vec(),
            data: data.to_vec(),
        })
    }

    /// This prepares to stream a start packet
    pub fn serialize(&self) -> Vec<u8> {
        let mut result = Vec::new();

        // Serialize the fixed-size fields
        result.push(self.action.clone() as u8);
        result.push(self.priv_lvl);
        result.push(self.authen_type.clone() as u8);
        result.push(self.authen_service.clone() as u8);
        result.push(self.user_len);
        result.push(self.port_len);
        result.push(self.rem_addr_len);
        result.push(self.data_len);

        // Serialize the variable-size fields
        result.extend(&self.user);
        result.extend(&self.port);
        result.extend(&self.rem_addr);
        result.extend(&self.data);

        result
    }
}

// PLAuthenReplyPacket
pub struct PLAuthenReplyPacketIndexes {
    status: usize,
    flags: usize,
    server_msg_len: usize,
    data_len: usize,
}

const PL_AUTHENTICATION_REPLY_PACKET_INDEXES: PLAuthenReplyPacketIndexes =
    PLAuthenReplyPacketIndexes {
        status: 0,
        flags: 1,
        server_msg_len: 2,
        data_len: 4,
    };

const PL_REPLY_TEXT_START: usize = PL_AUTHENTICATION_REPLY_PACKET_INDEXES.data_len + 2;

#[derive(Debug)]
pub struct PLAuthenReplyPacket {
    pub status: u8,
    pub flags: u8,
    server_msg_len: u16,
    data_len: u16,
    pub server_msg: Vec<u8>,
    data: Vec<u8>,
}

#[derive(Debug)]
#[repr(u8)]
pub enum PLAuthenReplyStatus {
    TAC_PLUS_AUTHEN_STATUS_PASS = 0x01,
    TAC_PLUS_AUTHEN_STATUS_FAIL = 0x02,
    TAC_PLUS_AUTHEN_STATUS_GETDATA = 0x03,
    TAC_PLUS_AUTHEN_STATUS_GETUSER = 0x04,
    TAC_PLUS_AUTHEN_STATUS_GETPASS = 0x05,
    TAC_PLUS_AUTHEN_STATUS_RESTART = 0x06,
    TAC_PLUS_AUTHEN_STATUS_ERROR = 0x07,
    TAC_PLUS_AUTHEN_STATUS_FOLLOW = 0x21,
}

impl_global_consts!(
    PLAuthenReplyStatus,
    TAC_PLUS_AUTHEN_STATUS_PASS,
    TAC_PLUS_AUTHEN_STATUS_FAIL,
    TAC_PLUS_AUTHEN_STATUS_GETDATA,
    TAC_PLUS_AUTHEN_STATUS_GETUSER,
    TAC_PLUS_AUTHEN_STATUS_GETPASS,
    TAC_PLUS_AUTHEN_STATUS_RESTART,
    TAC_PLUS_AUTHEN_STATUS_ERROR,
    TAC_PLUS_AUTHEN_STATUS_FOLLOW
);

/// This processes the decrypted Reply packet
/// and implements the following checks:
///
/// - That the headers are presumably present
/// - That the length fields add up to the body handed over
/// - That the server_msg is printable, since it is relayed
///    to a human at the terminal
///
impl PLAuthenReplyPacket {
    #[allow(clippy::indexing_slicing)]
    pub fn from_raw_packet(pck_buf: &[u8]) -> Result<Self, &str> {
        // it seems risky to have the protocol do this unchecked.
        if pck_buf.len() < 6 {
            return Err("Malformed authentication reply (too short)");
        }

        let purported_server_msg_len = read_be_u16(
            &mut &pck_buf[PL_AUTHENTICATION_REPLY_PACKET_INDEXES.server_msg_len
                ..PL_AUTHENTICATION_REPLY_PACKET_INDEXES.server_msg_len + 2],
        )
        .map_or(Err("read_be_u16 can only process 2-slices"), Ok)?;
        let purported_data_len = read_be_u16(
            &mut &pck_buf[PL_AUTHENTICATION_REPLY_PACKET_INDEXES.data_len
                ..PL_AUTHENTICATION_REPLY_PACKET_INDEXES.data_len + 2],
        )
        .map_or(Err("read_be_u16 can only process 2-slices"), Ok)?;

        let purported_size =
            (purported_server_msg_len as usize) + (purported_data_len as usize) + 6;
        let expected_size = pck_buf.len();

        if purported_size != expected_size {
            return Err("Malformed packet size (doesn't add up)");
        }

        let ret = Self {
            status: pck_buf[PL_AUTHENTICATION_REPLY_PACKET_INDEXES.status],
            flags: pck_buf[PL_AUTHENTICATION_REPLY_PACKET_INDEXES.flags],
            server_msg_len: purported_server_msg_len,
            data_len: purported_data_len,
            server_msg: pck_buf
                [PL_REPLY_TEXT_START..PL_REPLY_TEXT_START + (purported_server_msg_len as usize)]
                .to_vec(),

            data: pck_buf[PL_REPLY_TEXT_START + (purported_server_msg_len as usize)..].to_vec(),
        };

        if ret
            .server_msg
            .iter()
            .map(|c| c.is_ascii_control())
            .reduce(|c_1, cs| c_1 || cs)
            .unwrap_or(false)
        {
            return Err("Non-printable characters in TACACS Authen Reply server_msg");
        }

        Ok(ret)
    }
}

#[derive(Debug)]
pub struct PLAuthenContinuePacket {
    user_msg_len: u16,
    data_len: u16,
    flags: u8,
    pub user_msg: Vec<u8>,
    data: Vec<u8>,
}

impl PLAuthenContinuePacket {
    /// Carry one field the server asked for, username or password.
    #[allow(clippy::cast_possible_truncation)]
    pub fn get_user_msg_packet(user_msg: &[u8]) -> Result<Self, &'static str> {
        if user_msg.len() > 65535 {
            return Err("Continue field must fit in two length bytes");
        }

        Ok(Self {
            user_msg_len: user_msg.len() as u16,
            data_len: 0,
            flags: 0,
            user_msg: user_msg.to_vec(),
            data: vec![],
        })
    }

    /// This prepares to stream a continue
    pub fn serialize(&self) -> Vec<u8> {
        let mut result = Vec::new();

        // Serialize the fixed-size fields
        result.extend(&self.user_msg_len.to_be_bytes());
        result.extend(&self.data_len.to_be_bytes());
        result.push(self.flags);

        // Serialize the variable-size fields
        result.extend(&self.user_msg);
        result.extend(&self.data);

        result
    }
}

// This is a standard ASCII authentication, from the client's chair. The START packet MAY carry the username. If it does not, the server asks for it with a REPLY TAC_PLUS_AUTHEN_STATUS_GETUSER and the client answers with a CONTINUE. The password is always fetched with TAC_PLUS_AUTHEN_STATUS_GETPASS. The session is composed of a single START followed by zero or more pairs of REPLYs and CONTINUEs, followed by a final REPLY indicating PASS, FAIL, or ERROR.

pub struct PLAuthenSess<'a> {
    pl_curr_seqno: u8, // 1-255, always tx odd rx even, session ends if a wrap occurs
    pl_my_sessid: u32,
    pl_my_version: u8,
    pl_key: &'a ProtectedBox<flex_alloc::vec::Vec<u8, SecureAlloc>>,
}

impl<'a> PLAuthenSess<'a> {
    /// Session numbers identify us to the server for the whole
    /// conversation, RFC8907 wants them from a CSPRNG.
    pub fn new(ses: u32, version: u8, key: &'a ProtectedBox<flex_alloc::vec::Vec<u8, SecureAlloc>>) -> Self {
        Self {
            pl_curr_seqno: 0,
            pl_my_sessid: ses,
            pl_my_version: version,
            pl_key: key,
        }
    }

    pub fn get_session_id(&self) -> u32 {
        self.pl_my_sessid
    }

    /// Frame, obfuscate and stream one request body.
    async fn transmit_request(
        &mut self,
        stream: &mut TcpStream,
        body_bytes: &[u8],
    ) -> Result<(), &'static str> {
        let req_hdr = PLHeader::get_request_header(
            self.pl_my_sessid,
            PLTACType::TAC_PLUS_AUTHEN,
            body_bytes,
            self.pl_curr_seqno,
            self.pl_my_version,
        );

        let mut key_bytes = vec![];
        self.pl_key.expose_read(|inner_key| {
            key_bytes = inner_key.iter().map(|z| *z).collect::<Vec<u8>>();
        });

        let req_pkt = PLPacket::from_parts(req_hdr, body_bytes.to_vec(), Some(&key_bytes));
        let msg = req_pkt.serialize();

        match stream.write(&msg).await {
            Ok(v) => {
                if self.inc_seqno().is_err() {
                    return Err("Wrapped sequence number, restart single-session");
                }
                Ok(())
            }
            Err(e) => Err("Bad TCP Session"),
        }
    }

    /// Pull the next reply off the stream, de-obfuscate, decode.
    async fn expect_reply(&mut self, stream: &mut TcpStream) -> Result<PLAuthenReplyPacket, &'static str> {
        let reply_hdr = match PLHeader::parse_reply_header(stream, self.pl_curr_seqno).await {
            Ok(h) => {
                if self.inc_seqno().is_err() {
                    return Err("Wrapped sequence number, restart single-session");
                }
                h
            }
            Err(e) => {
                return Err(e);
            }
        };

        if reply_hdr.tacp_hdr_sesid != self.pl_my_sessid {
            return Err("Server replied for some other session");
        }

        match reply_hdr.tacp_hdr_type {
            PLTACType::TAC_PLUS_AUTHEN => (),
            PLTACType::TAC_PLUS_AUTHOR => {
                return Err("Unexpected Authorization reply from server");
            }
            PLTACType::TAC_PLUS_ACCT => {
                return Err("Unexpected Accounting reply from server");
            }
        }

        reply_hdr.parse_reply_packet(stream, self.pl_key).await
    }

    /// Run one ASCII login conversation to its final verdict.
    ///
    /// The username rides along in the START, the server still gets
    /// to ask for it again with GETUSER. The server MUST limit the
    /// number of retries that are permitted, and so do we.
    ///
    pub async fn do_ascii_login(
        &mut self,
        mut stream: &mut TcpStream,
        user: &[u8],
        pass: &[u8],
        port: &[u8],
        rem_addr: &[u8],
    ) -> Result<bool, &'static str> {
        if self.pl_my_version != TAC_PLUS_MINOR_VER_DEFAULT {
            return Err("ASCII login takes the default minor version");
        }

        let start = PLAuthenStartPacket::get_ascii_login_packet(user, port, rem_addr)?;
        self.transmit_request(&mut stream, &start.serialize()).await?;

        let mut rounds = 0;
        loop {
            if rounds > 9 {
                return Err("Server keeps the conversation going, abandoning session");
            }
            rounds += 1;

            let reply = self.expect_reply(&mut stream).await?;
            match reply.status {
                TAC_PLUS_AUTHEN_STATUS_PASS => return Ok(true),
                TAC_PLUS_AUTHEN_STATUS_FAIL => return Ok(false),
                TAC_PLUS_AUTHEN_STATUS_GETUSER => {
                    let cont = PLAuthenContinuePacket::get_user_msg_packet(user)?;
                    self.transmit_request(&mut stream, &cont.serialize()).await?;
                }
                TAC_PLUS_AUTHEN_STATUS_GETPASS => {
                    let cont = PLAuthenContinuePacket::get_user_msg_packet(pass)?;
                    self.transmit_request(&mut stream, &cont.serialize()).await?;
                }
                TAC_PLUS_AUTHEN_STATUS_GETDATA => {
                    return Err("Server requested data collection, not supported");
                }
                TAC_PLUS_AUTHEN_STATUS_RESTART => {
                    return Err("Server requested a session restart");
                }
                TAC_PLUS_AUTHEN_STATUS_ERROR => {
                    return Err("Server reported an error, check server logs");
                }
                TAC_PLUS_AUTHEN_STATUS_FOLLOW => {
                    return Err("Server referred us elsewhere, not supported");
                }
                _ => return Err("Unknown reply status from server"),
            }
        }
    }

    /// PAP hands over the whole credential pair in the START and the
    /// server answers with the verdict, one round trip, minor
    /// version one.
    ///
    pub async fn do_pap_login(
        &mut self,
        mut stream: &mut TcpStream,
        user: &[u8],
        pass: &[u8],
        port: &[u8],
        rem_addr: &[u8],
    ) -> Result<bool, &'static str> {
        if self.pl_my_version != TAC_PLUS_MINOR_VER_ONE {
            return Err("PAP requires minor version one");
        }

        let start = PLAuthenStartPacket::get_pap_login_packet(user, pass, port, rem_addr)?;
        self.transmit_request(&mut stream, &start.serialize()).await?;

        let reply = self.expect_reply(&mut stream).await?;
        match reply.status {
            TAC_PLUS_AUTHEN_STATUS_PASS => Ok(true),
            TAC_PLUS_AUTHEN_STATUS_FAIL => Ok(false),
            TAC_PLUS_AUTHEN_STATUS_ERROR => Err("Server reported an error, check server logs"),
            _ => Err("Unexpected reply status for PAP authentication"),
        }
    }

    fn inc_seqno(&mut self) -> Result<bool, &'static str> {
        if self.pl_curr_seqno == 255 {
            return Err("Session restart");
        } else {
            self.pl_curr_seqno += 1;
            return Ok(true);
        }
    }
}

#[allow(clippy::indexing_slicing)]
/// Uses a TACACS+ MD5 pad to obfuscate or deobfuscate a message
///
/// ⚡ This won't work if you call it without a proper pad.
///
pub fn md5_xor(msg: &[u8], pad: &[u8]) -> Vec<u8> {
    // Create a new vector to hold the result
    let mut result = Vec::with_capacity(msg.len());

    // Perform the XOR operation byte by byte
    for i in 0..msg.len() {
        result.push(msg[i] ^ pad[i % pad.len()]);
    }

    result
}

/// This is from an example provided in the Rust std docs.
///
/// ⚡ The length of any slice passed must be 4.
///
/// ```
/// assert_eq!(4, std::mem::size_of::<u32>());
/// ```
///
fn read_be_u32<'a>(input: &'a mut &'a [u8]) -> Result<u32, &'a str> {
    if input.len() < 4 {
        return Err("read_be_u32 can only process 4-slices");
    }
    let (int_bytes, rest) = input.split_at(4);
    *input = rest;
    #[allow(clippy::unwrap_used)]
    Ok(u32::from_be_bytes(int_bytes.try_into().unwrap()))
}

/// This is from an example provided in the Rust std docs.
///
/// ⚡ The length of any slice passed must be 2.
///
/// ```
/// assert_eq!(2, std::mem::size_of::<u16>());
/// ```
///
fn read_be_u16<'a>(input: &'a mut &'a [u8]) -> Result<u16, &'a str> {
    if input.len() < 2 {
        return Err("read_be_u32 can only process 4-slices");
    }
    let (int_bytes, rest) = input.split_at(2);
    *input = rest;
    #[allow(clippy::unwrap_used)]
    Ok(u16::from_be_bytes(int_bytes.try_into().unwrap()))
}
