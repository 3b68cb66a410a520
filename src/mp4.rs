use std::env;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::Error;

// -----------------------------
// MP4 track probing (minimal ISO-BMFF)
// -----------------------------

/// One `trak` box, in file order. The position is the stream index a demuxer uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TrackInfo {
    pub(crate) index: usize,
    pub(crate) handler: [u8; 4],
}

impl TrackInfo {
    /// Anything that is neither picture nor sound: `meta`, `text`, `gpmd`, `data`, ...
    pub(crate) fn is_data(&self) -> bool {
        self.handler != fourcc("vide") && self.handler != fourcc("soun")
    }
}

fn read_be_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_be_bytes(b))
}

fn read_be_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_be_bytes(b))
}

#[derive(Debug, Clone)]
struct BoxHeader {
    typ: [u8; 4],
    size: u64,
    header_len: u64,
}

fn read_box_header<R: Read>(r: &mut R) -> io::Result<BoxHeader> {
    let size32 = read_be_u32(r)? as u64;
    let mut typ = [0u8; 4];
    r.read_exact(&mut typ)?;
    if size32 == 1 {
        // largesize
        let size64 = read_be_u64(r)?;
        Ok(BoxHeader {
            typ,
            size: size64,
            header_len: 16,
        })
    } else {
        Ok(BoxHeader {
            typ,
            size: size32,
            header_len: 8,
        })
    }
}

const fn fourcc(s: &str) -> [u8; 4] {
    let b = s.as_bytes();
    [b[0], b[1], b[2], b[3]]
}

fn fourcc_to_string(t: [u8; 4]) -> String {
    t.iter()
        .map(|&c| if c.is_ascii_graphic() { c as char } else { '.' })
        .collect()
}

fn trace_enabled() -> bool {
    matches!(
        env::var("DASHCAM_META_TRACE_MP4").as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes") | Ok("YES")
    )
}

fn trace_box(ctx: &str, start: u64, hdr: &BoxHeader, limit: u64) {
    if trace_enabled() {
        tracing::trace!(
            "[mp4] {ctx}: pos={start} typ={} size={} header={} limit={}",
            fourcc_to_string(hdr.typ),
            hdr.size,
            hdr.header_len,
            limit
        );
    }
}

fn safe_box_end(ctx: &str, start: u64, hdr: &BoxHeader, limit: u64) -> Result<u64, Error> {
    // size==0 means "extends to end of the containing box".
    let mut size = hdr.size;
    if size == 0 {
        size = limit.saturating_sub(start);
    }
    if size < hdr.header_len {
        return Err(Error::Mp4InvalidBox {
            context: ctx.to_string(),
            box_type: fourcc_to_string(hdr.typ),
            offset: start,
            message: format!("size {size} < header_len {}", hdr.header_len),
        });
    }

    // Clamp to the containing limit so truncated recordings still walk.
    let end = start.saturating_add(size).min(limit);

    if end <= start {
        return Err(Error::Mp4InvalidBox {
            context: ctx.to_string(),
            box_type: fourcc_to_string(hdr.typ),
            offset: start,
            message: format!("non-advancing end {end}"),
        });
    }

    Ok(end)
}

/// Walk the boxes directly inside `[pos, end)` and call `visit` with each header and its bounds.
fn for_each_child<R: Read + Seek>(
    f: &mut R,
    ctx: &str,
    mut pos: u64,
    end: u64,
    mut visit: impl FnMut(&mut R, &BoxHeader, u64, u64) -> Result<(), Error>,
) -> Result<(), Error> {
    while pos + 8 <= end {
        f.seek(SeekFrom::Start(pos))?;
        let hdr = read_box_header(f)?;
        trace_box(ctx, pos, &hdr, end);
        let box_end = safe_box_end(ctx, pos, &hdr, end)?;
        visit(f, &hdr, pos + hdr.header_len, box_end)?;
        pos = box_end;
    }
    Ok(())
}

pub(crate) fn probe_tracks<R: Read + Seek>(f: &mut R) -> Result<Vec<TrackInfo>, Error> {
    let mut tracks = Vec::new();
    let file_len = f.seek(SeekFrom::End(0))?;

    for_each_child(f, "top", 0, file_len, |f, hdr, payload, end| {
        if hdr.typ == fourcc("moov") {
            parse_moov(f, payload, end, &mut tracks)?;
        }
        Ok(())
    })?;

    Ok(tracks)
}

fn parse_moov<R: Read + Seek>(
    f: &mut R,
    pos: u64,
    end: u64,
    tracks: &mut Vec<TrackInfo>,
) -> Result<(), Error> {
    for_each_child(f, "moov", pos, end, |f, hdr, payload, box_end| {
        if hdr.typ == fourcc("trak") {
            let handler = parse_trak_handler(f, payload, box_end)?.unwrap_or(*b"????");
            tracks.push(TrackInfo {
                index: tracks.len(),
                handler,
            });
        }
        Ok(())
    })
}

fn parse_trak_handler<R: Read + Seek>(
    f: &mut R,
    pos: u64,
    end: u64,
) -> Result<Option<[u8; 4]>, Error> {
    let mut handler = None;
    for_each_child(f, "trak", pos, end, |f, hdr, payload, box_end| {
        if hdr.typ == fourcc("mdia") && handler.is_none() {
            handler = parse_mdia_handler(f, payload, box_end)?;
        }
        Ok(())
    })?;
    Ok(handler)
}

fn parse_mdia_handler<R: Read + Seek>(
    f: &mut R,
    pos: u64,
    end: u64,
) -> Result<Option<[u8; 4]>, Error> {
    let mut handler = None;
    for_each_child(f, "mdia", pos, end, |f, hdr, payload, box_end| {
        // hdlr: version/flags (4) + pre_defined (4) + handler_type (4)
        if hdr.typ == fourcc("hdlr") && payload + 12 <= box_end {
            f.seek(SeekFrom::Start(payload + 8))?;
            let mut ht = [0u8; 4];
            f.read_exact(&mut ht)?;
            handler = Some(ht);
        }
        Ok(())
    })?;
    Ok(handler)
}

/// Stream indices of the non-audio/video tracks in an MP4/MOV container, in file order.
pub fn probe_data_streams(path: impl AsRef<Path>) -> Result<Vec<usize>, Error> {
    let mut reader = BufReader::new(File::open(path)?);
    let tracks = probe_tracks(&mut reader)?;
    Ok(tracks.iter().filter(|t| t.is_data()).map(|t| t.index).collect())
}
