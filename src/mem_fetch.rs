use super::address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    READ_REQUEST = 0,
    WRITE_REQUEST,
    READ_REPLY,
    WRITE_ACK,
}

/// The two disjoint address spaces a transfer moves data between.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum::Display,
)]
pub enum MemorySpace {
    /// Main memory shared by all cores.
    Global,
    /// Per-core scratchpad memory.
    Local,
}

/// Response status reported by the memory model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Ok,
    /// The addressed range does not exist in the target memory.
    Fault,
}

/// Request tag.
///
/// Identifies the issuing channel and a sub-transaction that is unique
/// among the channel's outstanding sub-transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub channel: usize,
    pub id: u32,
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ch{}#{}", self.channel, self.id)
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemReq {
    /// Address within the target memory space
    pub addr: address,
    pub size: u32,
    pub kind: Kind,
    pub space: MemorySpace,
    /// Write payload (empty for reads)
    pub data: Vec<u8>,
    pub tag: Tag,
    /// Unique sequence number for ordering and latency diagnostics
    pub uid: u64,
    /// Target core for local memory requests
    pub core_id: Option<usize>,
    /// Input index stamped by the arbiter for response routing
    pub source: Option<usize>,
    pub issue_cycle: u64,
}

impl std::fmt::Debug for MemReq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemReq")
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("size", &self.size)
            .field("kind", &self.kind)
            .field("space", &self.space)
            .field("tag", &self.tag)
            .field("uid", &self.uid)
            .field("core_id", &self.core_id)
            .field("issue_cycle", &self.issue_cycle)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for MemReq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?}({}@{:#x}+{}, tag={}, uid={})",
            self.kind, self.space, self.addr, self.size, self.tag, self.uid
        )
    }
}

impl MemReq {
    #[must_use]
    pub fn is_write(&self) -> bool {
        self.kind == Kind::WRITE_REQUEST
    }

    #[must_use]
    pub fn access_kind(&self) -> stats::mem::AccessKind {
        use stats::mem::AccessKind;
        match (self.space, self.is_write()) {
            (MemorySpace::Global, false) => AccessKind::GLOBAL_ACC_R,
            (MemorySpace::Global, true) => AccessKind::GLOBAL_ACC_W,
            (MemorySpace::Local, false) => AccessKind::LOCAL_ACC_R,
            (MemorySpace::Local, true) => AccessKind::LOCAL_ACC_W,
        }
    }

    /// Build the response to this request.
    ///
    /// Reads carry `data` back, writes are acknowledged without payload.
    #[must_use]
    pub fn into_response(self, status: Status, data: Vec<u8>) -> MemRsp {
        let kind = if self.is_write() {
            Kind::WRITE_ACK
        } else {
            Kind::READ_REPLY
        };
        MemRsp {
            kind,
            status,
            space: self.space,
            data,
            tag: self.tag,
            uid: self.uid,
            core_id: self.core_id,
            source: self.source,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemRsp {
    pub kind: Kind,
    pub status: Status,
    pub space: MemorySpace,
    pub data: Vec<u8>,
    pub tag: Tag,
    pub uid: u64,
    pub core_id: Option<usize>,
    pub source: Option<usize>,
}

impl std::fmt::Debug for MemRsp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemRsp")
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("space", &self.space)
            .field("tag", &self.tag)
            .field("uid", &self.uid)
            .field("bytes", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for MemRsp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?}({}, {:?}, tag={}, uid={})",
            self.kind, self.space, self.status, self.tag, self.uid
        )
    }
}

impl MemRsp {
    #[must_use]
    pub fn is_fault(&self) -> bool {
        self.status == Status::Fault
    }
}

#[cfg(test)]
mod tests {
    use super::{Kind, MemReq, MemorySpace, Status, Tag};
    use stats::mem::AccessKind;

    fn request(kind: Kind, space: MemorySpace) -> MemReq {
        MemReq {
            addr: 0x40,
            size: 4,
            kind,
            space,
            data: vec![],
            tag: Tag { channel: 1, id: 7 },
            uid: 3,
            core_id: Some(0),
            source: Some(2),
            issue_cycle: 10,
        }
    }

    #[test]
    fn test_access_kind() {
        assert_eq!(
            request(Kind::READ_REQUEST, MemorySpace::Global).access_kind(),
            AccessKind::GLOBAL_ACC_R
        );
        assert_eq!(
            request(Kind::WRITE_REQUEST, MemorySpace::Local).access_kind(),
            AccessKind::LOCAL_ACC_W
        );
    }

    #[test]
    fn test_response_echoes_routing_information() {
        let rsp = request(Kind::WRITE_REQUEST, MemorySpace::Local).into_response(Status::Ok, vec![]);
        assert_eq!(rsp.kind, Kind::WRITE_ACK);
        assert_eq!(rsp.tag, Tag { channel: 1, id: 7 });
        assert_eq!(rsp.uid, 3);
        assert_eq!(rsp.source, Some(2));
        assert_eq!(rsp.space, MemorySpace::Local);

        let rsp = request(Kind::READ_REQUEST, MemorySpace::Global)
            .into_response(Status::Fault, vec![]);
        assert_eq!(rsp.kind, Kind::READ_REPLY);
        assert!(rsp.is_fault());
    }
}
