//! MPEG-4 movie box access: edit lists on read, finalization on write.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use mp4::{BoxHeader, BoxType, MoovBox, ReadBox, WriteBox, HEADER_SIZE};

use crate::error::BoostError;

/// Presented part of a track, in frames of its media timescale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EditWindow {
    /// Leading frames that are decoded but not presented.
    pub skip: u64,
    /// Frames presented after `skip`.
    pub frames: u64,
}

const EMPTY_EDIT_32: u64 = u32::MAX as u64;

/// Locate and parse the `moov` box of an MPEG-4 file.
///
/// Returns `None` when the stream does not start with `ftyp` or has no movie box.
pub(crate) fn read_movie<R: Read + Seek>(
    reader: &mut R,
) -> Result<Option<(u64, MoovBox)>, mp4::Error> {
    let end = reader.seek(SeekFrom::End(0))?;
    let mut offset = 0;

    while offset + HEADER_SIZE <= end {
        reader.seek(SeekFrom::Start(offset))?;
        let header = BoxHeader::read(reader)?;
        match header.name {
            BoxType::MoovBox => {
                return MoovBox::read_box(reader, header.size).map(|moov| Some((offset, moov)));
            }
            BoxType::FtypBox => {}
            _ if offset == 0 => return Ok(None),
            _ => {}
        }
        if header.size < HEADER_SIZE {
            return Ok(None);
        }
        offset += header.size;
    }

    Ok(None)
}

/// Edit window of the `track_index`-th track of `path`, if it declares one.
pub(crate) fn edit_window(path: &Path, track_index: usize) -> Option<EditWindow> {
    let mut reader = BufReader::new(File::open(path).ok()?);
    let (_, moov) = read_movie(&mut reader).ok()??;
    let movie_scale = u64::from(moov.mvhd.timescale);
    let trak = moov.traks.get(track_index)?;
    let media_scale = u64::from(trak.mdia.mdhd.timescale);
    if movie_scale == 0 || media_scale == 0 {
        return None;
    }

    let entry = trak
        .edts
        .as_ref()?
        .elst
        .as_ref()?
        .entries
        .iter()
        .find(|entry| entry.media_time != EMPTY_EDIT_32 && entry.media_time != u64::MAX)?;

    Some(EditWindow {
        skip: entry.media_time,
        frames: rescale(entry.segment_duration, movie_scale, media_scale),
    })
}

/// Rewrite the trailing movie box of a freshly muxed AAC file.
///
/// Adds an edit list presenting `window`, sets the track and movie durations
/// to the presented length and marks the SL descriptor as predefined MP4.
pub(crate) fn finalize_aac_movie(file: &mut File, window: EditWindow) -> Result<(), BoostError> {
    let finalize = |err: String| BoostError::FinalizeFailed(err);

    let end = file.seek(SeekFrom::End(0))?;
    let (offset, mut moov) = read_movie(file)
        .map_err(|err| finalize(err.to_string()))?
        .ok_or_else(|| finalize("muxed file has no movie box".to_string()))?;
    if offset + moov.get_size() != end {
        return Err(finalize("movie box is not the last box".to_string()));
    }

    let movie_scale = u64::from(moov.mvhd.timescale);
    let trak = moov
        .traks
        .first_mut()
        .ok_or_else(|| finalize("muxed file has no track".to_string()))?;
    let media_scale = u64::from(trak.mdia.mdhd.timescale);
    if movie_scale == 0 || media_scale == 0 {
        return Err(finalize("zero timescale".to_string()));
    }
    let presented = rescale(window.frames, media_scale, movie_scale);

    trak.tkhd.duration = presented;
    let elst = trak
        .edts
        .get_or_insert_with(Default::default)
        .elst
        .get_or_insert_with(Default::default);
    elst.entries.clear();
    elst.entries.push(Default::default());
    if let Some(entry) = elst.entries.last_mut() {
        entry.segment_duration = presented;
        entry.media_time = window.skip;
        entry.media_rate = 1;
        entry.media_rate_fraction = 0;
    }
    moov.mvhd.duration = presented;

    let mut bytes = Vec::with_capacity(moov.get_size() as usize);
    moov.write_box(&mut bytes)
        .map_err(|err| finalize(err.to_string()))?;
    if !set_sl_predefined(&mut bytes) {
        return Err(finalize("esds has no SL descriptor".to_string()));
    }

    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&bytes)?;
    file.set_len(offset + bytes.len() as u64)?;
    file.flush()?;
    Ok(())
}

/// Set the SL descriptor ending the `esds` box to length 1, predefined 2.
fn set_sl_predefined(moov: &mut [u8]) -> bool {
    let Some(tag) = moov.windows(4).position(|name| name == b"esds") else {
        return false;
    };
    if tag < 4 {
        return false;
    }
    let start = tag - 4;
    let mut size = [0_u8; 4];
    size.copy_from_slice(&moov[start..tag]);
    let end = start + u32::from_be_bytes(size) as usize;
    if end > moov.len() || end < tag + 3 {
        return false;
    }

    let sl = &mut moov[end - 3..end];
    if sl[0] != 0x06 {
        return false;
    }
    sl.copy_from_slice(&[0x06, 0x01, 0x02]);
    true
}

fn rescale(value: u64, from: u64, to: u64) -> u64 {
    if from == to {
        return value;
    }
    ((u128::from(value) * u128::from(to) + u128::from(from) / 2) / u128::from(from)) as u64
}
