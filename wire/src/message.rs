use bytes::{BufMut, Bytes, BytesMut};

/// Bytes in a frame header: 1 opcode byte plus the length field.
pub const HEADER_LEN: usize = 1 + LEN_DIGITS;

/// Width of the zero-padded decimal body-length field.
pub const LEN_DIGITS: usize = 10;

/// Body length is bounded by the platform's signed 32-bit range.
pub const MAX_BODY_LEN: usize = i32::MAX as usize;

/// Operation tags carried in the first header byte.
///
/// The numeric values are part of the wire contract and must not change.
/// Parity is a reading convention only (odd = commander to worker, even =
/// worker to commander); nothing enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Unknown = 0,
    ReadDir = 1,
    FileReport = 2,
    SearchPatient = 3,
    SearchSuccess = 4,
    DiseaseFrequency = 5,
    DiseaseFrequencyResult = 6,
    NumAdmissions = 7,
    NumAdmissionsResult = 8,
    NumDischarges = 9,
    NumDischargesResult = 10,
    SearchFailure = 11,
    TopkAgeRanges = 12,
    TopkAgeRangesResult = 13,
    ReadDirReplacement = 21,
    FileReportReplacement = 22,
    ServerInfo = 33,
    WorkerListening = 38,
    WorkerListeningReplacement = 40,
    ClientRequest = 50,
    RequestResult = 51,
    EndOfTransmission = 66,
    ResponseReceived = 67,
}

impl From<u8> for Opcode {
    fn from(tag: u8) -> Self {
        match tag {
            1 => Opcode::ReadDir,
            2 => Opcode::FileReport,
            3 => Opcode::SearchPatient,
            4 => Opcode::SearchSuccess,
            5 => Opcode::DiseaseFrequency,
            6 => Opcode::DiseaseFrequencyResult,
            7 => Opcode::NumAdmissions,
            8 => Opcode::NumAdmissionsResult,
            9 => Opcode::NumDischarges,
            10 => Opcode::NumDischargesResult,
            11 => Opcode::SearchFailure,
            12 => Opcode::TopkAgeRanges,
            13 => Opcode::TopkAgeRangesResult,
            21 => Opcode::ReadDirReplacement,
            22 => Opcode::FileReportReplacement,
            33 => Opcode::ServerInfo,
            38 => Opcode::WorkerListening,
            40 => Opcode::WorkerListeningReplacement,
            50 => Opcode::ClientRequest,
            51 => Opcode::RequestResult,
            66 => Opcode::EndOfTransmission,
            67 => Opcode::ResponseReceived,
            _ => Opcode::Unknown,
        }
    }
}

/// One framed message: an opcode tag plus an opaque body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub opcode: Opcode,
    pub body: Bytes,
}

impl Message {
    pub fn new(opcode: Opcode, body: impl Into<Bytes>) -> Self {
        Message {
            opcode,
            body: body.into(),
        }
    }

    /// Convenience constructor for text bodies.
    pub fn text(opcode: Opcode, body: impl Into<String>) -> Self {
        Message::new(opcode, body.into().into_bytes())
    }

    /// The body interpreted as text, as every caller does.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Append the framed representation to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        debug_assert!(self.body.len() <= MAX_BODY_LEN);
        buf.reserve(HEADER_LEN + self.body.len());
        buf.put_u8(self.opcode as u8);
        buf.put_slice(format!("{:010}", self.body.len()).as_bytes());
        buf.put_slice(&self.body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_header_and_body() {
        let msg = Message::text(Opcode::ReadDir, "Spain");
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);
        assert_eq!(&buf[..], b"\x010000000005Spain");
    }

    #[test]
    fn empty_body_is_all_zero_length() {
        let msg = Message::text(Opcode::EndOfTransmission, "");
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN);
        assert_eq!(&buf[1..], b"0000000000");
    }

    #[test]
    fn unknown_tags_decode_to_unknown() {
        assert_eq!(Opcode::from(250), Opcode::Unknown);
        assert_eq!(Opcode::from(66), Opcode::EndOfTransmission);
    }
}
