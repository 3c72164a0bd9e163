//! Dump request handling: multipart response reassembly.
//!
//! List operations send a single request with the dump flag and the
//! kernel streams records back across one or more datagram batches.
//! Each batch holds self-describing sub-messages; the stream ends with
//! an end-of-dump sentinel, or with a batch whose messages lack the
//! multipart flag.

use tracing::trace;

use crate::builder::MessageBuilder;
use crate::error::{Error, Result};
use crate::genl::{self, GENL_HDRLEN, GenlMsgHdr};
use crate::handle::Handle;
use crate::message::{MessageIter, NLM_F_DUMP, NlMsgHdr, NlMsgType};

/// Send a dump command and collect every record the kernel returns.
///
/// `parse` decodes one record's attribute block. Any malformed record
/// or unexpected control message fails the whole dump; callers never
/// see a partial collection.
pub(crate) fn dump<T>(
    hndl: Option<&Handle>,
    family_id: u16,
    cmd: u8,
    build_attrs: impl FnOnce(&mut MessageBuilder),
    parse: impl Fn(&[u8]) -> Result<T>,
) -> Result<Vec<T>> {
    let owned;
    let hndl = match hndl {
        Some(h) => h,
        None => {
            owned = Handle::open()?;
            &owned
        }
    };

    let mut builder = genl::netlabel_msg(family_id, cmd, NLM_F_DUMP);
    build_attrs(&mut builder);
    builder.set_seq(hndl.next_seq());
    builder.set_pid(hndl.pid());

    hndl.send(&builder.finish()?)?;

    let mut records = Vec::new();
    loop {
        let batch = hndl.recv_raw()?;
        trace!(len = batch.len(), "dump batch");
        if walk_batch(&batch, cmd, &parse, &mut records)? {
            break;
        }
    }

    Ok(records)
}

/// Walk one batch of dump sub-messages, appending parsed records.
///
/// Returns `true` when the dump is complete: either an end sentinel
/// was seen or the batch was not multipart.
fn walk_batch<T>(
    data: &[u8],
    cmd: u8,
    parse: &impl Fn(&[u8]) -> Result<T>,
    records: &mut Vec<T>,
) -> Result<bool> {
    // An empty or short batch must error, not end the dump quietly.
    NlMsgHdr::from_bytes(data)?;

    let mut multi = false;
    let mut done = false;

    for result in MessageIter::new(data) {
        let (header, payload) = result?;

        if matches!(
            header.nlmsg_type,
            NlMsgType::NOOP | NlMsgType::ERROR | NlMsgType::OVERRUN
        ) {
            return Err(Error::BadMessage(format!(
                "control message type {} in dump",
                header.nlmsg_type
            )));
        }

        multi = header.is_multi();

        if header.is_done() {
            done = true;
            break;
        }

        let genl = GenlMsgHdr::from_bytes(payload).ok_or(Error::Truncated {
            expected: GENL_HDRLEN,
            actual: payload.len(),
        })?;
        if genl.cmd != cmd {
            return Err(Error::BadMessage(format!(
                "unexpected record command: expected {}, got {}",
                cmd, genl.cmd
            )));
        }

        records.push(parse(&payload[GENL_HDRLEN..])?);
    }

    Ok(done || !multi)
}
