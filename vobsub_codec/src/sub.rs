//! # Timed subtitles from a `*.sub` stream.
//!
//! A subtitle's SPU may be split across several PES packets.  The first
//! packet carries the presentation timestamp, and its first two payload
//! bytes give the size of the whole SPU, so we keep appending payloads
//! until we have that many bytes.

use std::time::Duration;

use crate::idx::IndexEntry;
use crate::mpeg2::clock::ticks_to_duration;
use crate::spu::{DecodeOptions, RenderedImage, SpuImage};
use crate::unit::{stream_units, StreamUnit, StreamUnits};
use crate::util::BytesFormatter;

/// The default time between two adjacent subtitles if no end time is
/// provided.  This is chosen to be a value that's usually representable in
/// SRT format, barring rounding errors.
pub const DEFAULT_SUBTITLE_SPACING: Duration = Duration::from_millis(1);

/// The default length of a subtitle if no end time is provided and no
/// subtitle follows immediately after.
pub const DEFAULT_SUBTITLE_LENGTH: Duration = Duration::from_secs(5);

/// A decoded SPU with its position on the timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct TimedSubtitleUnit {
    /// The subtitle image.
    pub image: SpuImage,
    /// When to start showing the subtitle.
    pub start: Duration,
    /// When to stop showing the subtitle.  `Subtitles` fills this in, and
    /// so does `assign_end_times`.
    pub end: Duration,
    /// The sub-picture stream (track) this subtitle came from.
    pub stream_id: u8,
    /// The `*.idx` entry covering the first packet of this subtitle.
    pub index_entry: IndexEntry,
}

impl TimedSubtitleUnit {
    /// Draw this subtitle.
    pub fn render(&self, options: &DecodeOptions) -> RenderedImage {
        self.image.render(options)
    }

    /// Should this subtitle be shown even when subtitles are turned off?
    pub fn forced(&self) -> bool {
        self.image.forced()
    }

    /// Work out when this subtitle ends, given when the next one starts.
    fn inferred_end(&self, next_start: Option<Duration>) -> Duration {
        let delay = self.image.delay();
        if delay > Duration::ZERO {
            return self.start + delay;
        }
        let longest = self.start + DEFAULT_SUBTITLE_LENGTH;
        match next_start {
            Some(next) => next
                .saturating_sub(DEFAULT_SUBTITLE_SPACING)
                .min(longest)
                .max(self.start),
            None => longest,
        }
    }
}

/// Set `end` for every unit: the unit's own stop delay if it has one, or
/// else just before the following unit (but no more than
/// `DEFAULT_SUBTITLE_LENGTH`).
pub fn assign_end_times(units: &mut [TimedSubtitleUnit]) {
    for i in 0..units.len() {
        let next_start = units.get(i + 1).map(|next| next.start);
        units[i].end = units[i].inferred_end(next_start);
    }
}

/// An SPU that we're still collecting bytes for.
struct PartialSpu {
    data: Vec<u8>,
    wanted: usize,
    start: Duration,
    stream_id: u8,
    index_entry: IndexEntry,
}

impl PartialSpu {
    fn new(unit: &StreamUnit, stream_id: u8) -> PartialSpu {
        let payload = unit.payload();
        let wanted = if payload.len() >= 2 {
            usize::from(payload[0]) << 8 | usize::from(payload[1])
        } else {
            payload.len()
        };
        let start = unit
            .presentation_timestamp()
            .map(ticks_to_duration)
            .unwrap_or(unit.index_entry.start_time);
        PartialSpu {
            data: payload.to_owned(),
            wanted,
            start,
            stream_id,
            index_entry: unit.index_entry.clone(),
        }
    }

    fn is_complete(&self) -> bool {
        self.data.len() >= self.wanted
    }

    /// Decode what we have.  Only fails if we don't even have the SPU's
    /// 4-byte header.
    fn finish(mut self) -> Option<TimedSubtitleUnit> {
        if self.data.len() > self.wanted {
            warn!("found 0x{:x} bytes of data in subtitle packet, wanted 0x{:x}",
                  self.data.len(), self.wanted);
            self.data.truncate(self.wanted);
        }
        match SpuImage::from_sp_packet(&self.data) {
            Ok(image) => Some(TimedSubtitleUnit {
                image,
                start: self.start,
                end: self.start,
                stream_id: self.stream_id,
                index_entry: self.index_entry,
            }),
            Err(err) => {
                warn!("dropping subtitle at {:?}: {}: {:?}",
                      self.start, err, BytesFormatter(&self.data));
                None
            }
        }
    }
}

/// An internal iterator over subtitles.  These subtitles may not have a
/// valid `end`, so we'll fix them up before letting the user see them.
struct SubtitlesInternal<'a> {
    units: StreamUnits<'a>,
    partial: Option<PartialSpu>,
}

impl<'a> SubtitlesInternal<'a> {
    /// Feed one stream unit into the reassembly buffer, and return any
    /// SPU this unit completes or interrupts.
    fn push(&mut self, unit: StreamUnit) -> Option<TimedSubtitleUnit> {
        let stream_id = match unit.sub_picture_stream_id() {
            Some(id) if unit.is_private_stream_1() => id,
            _ => {
                trace!("ignoring non-subtitle packet {:?}", unit.pes);
                return None;
            }
        };

        let starts_new_spu = unit.presentation_timestamp().is_some() || self.partial.is_none();
        if starts_new_spu {
            let interrupted = self.partial.take().and_then(|partial| {
                warn!("subtitle at {:?} is incomplete: have 0x{:x} of 0x{:x} bytes",
                      partial.start, partial.data.len(), partial.wanted);
                partial.finish()
            });
            let partial = PartialSpu::new(&unit, stream_id);
            if partial.is_complete() {
                // Only one of these can be returned now.  The interrupted
                // one is older, so stash the new one.
                return match interrupted {
                    Some(old) => {
                        self.partial = Some(partial);
                        Some(old)
                    }
                    None => partial.finish(),
                };
            }
            self.partial = Some(partial);
            return interrupted;
        }

        let partial = self.partial.as_mut()?;
        if partial.stream_id != stream_id {
            warn!("found subtitle for stream 0x{:x} while looking for 0x{:x}",
                  stream_id, partial.stream_id);
            return None;
        }
        partial.data.extend_from_slice(unit.payload());
        if partial.is_complete() {
            self.partial.take().and_then(PartialSpu::finish)
        } else {
            None
        }
    }
}

impl<'a> Iterator for SubtitlesInternal<'a> {
    type Item = TimedSubtitleUnit;

    fn next(&mut self) -> Option<Self::Item> {
        // A complete SPU left over from an interrupted one goes first.
        if self.partial.as_ref().map_or(false, PartialSpu::is_complete) {
            if let Some(done) = self.partial.take().and_then(PartialSpu::finish) {
                return Some(done);
            }
        }
        while let Some(unit) = self.units.next() {
            if let Some(done) = self.push(unit) {
                return Some(done);
            }
        }
        self.partial.take().and_then(|partial| {
            warn!("stream ended inside a subtitle");
            partial.finish()
        })
    }
}

/// An iterator over subtitles.
pub struct Subtitles<'a> {
    internal: SubtitlesInternal<'a>,
    prev: Option<TimedSubtitleUnit>,
}

impl<'a> Iterator for Subtitles<'a> {
    type Item = TimedSubtitleUnit;

    // We need to look one subtitle ahead, because a subtitle without a stop
    // delay ends when the next one starts.
    fn next(&mut self) -> Option<Self::Item> {
        let mut prev = match self.prev.take() {
            Some(prev) => prev,
            None => self.internal.next()?,
        };
        let curr = self.internal.next();
        prev.end = prev.inferred_end(curr.as_ref().map(|curr| curr.start));
        self.prev = curr;
        Some(prev)
    }
}

/// Return an iterator over the subtitles in a `*.sub` data stream.
/// `index` holds the `timestamp:` entries from the matching `*.idx` file,
/// and may be empty.
pub fn subtitles<'a>(input: &'a [u8], index: &'a [IndexEntry]) -> Subtitles<'a> {
    Subtitles {
        internal: SubtitlesInternal {
            units: stream_units(input, index),
            partial: None,
        },
        prev: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpeg2::clock::encode_timestamp;
    use crate::mpeg2::ps::FIXED_PACK_HEADER;
    use crate::spu::delay_to_millis;

    /// A tiny SPU with a single control sequence.  `stop` adds a
    /// StopDisplay command.
    fn spu(stop: bool) -> Vec<u8> {
        let mut spu = vec![0, 0, 0x00, 0x06, 0x40, 0x40, 0x00, 0x5a, 0x00, 0x06, 0x01];
        if stop {
            spu.push(0x02);
        }
        spu.push(0xff);
        let len = spu.len() as u16;
        spu[0..2].copy_from_slice(&len.to_be_bytes());
        spu
    }

    /// Wrap `payload` in a pack header and private-stream-1 PES packet.
    fn packet(pts: Option<u64>, stream_id: u8, payload: &[u8]) -> Vec<u8> {
        let mut header = vec![0x81];
        match pts {
            Some(pts) => {
                header.extend_from_slice(&[0x80, 0x05]);
                header.extend_from_slice(&encode_timestamp(0b0010, pts));
            }
            None => header.extend_from_slice(&[0x00, 0x00]),
        }
        header.push(stream_id);
        let mut out = FIXED_PACK_HEADER.to_vec();
        out.extend_from_slice(&[0x00, 0x00, 0x01, 0xbd]);
        out.extend_from_slice(&((header.len() + payload.len()) as u16).to_be_bytes());
        out.extend(header);
        out.extend_from_slice(payload);
        out
    }

    fn unit(start_ms: u64, stop: bool) -> TimedSubtitleUnit {
        TimedSubtitleUnit {
            image: SpuImage::from_sp_packet(&spu(stop)).unwrap(),
            start: Duration::from_millis(start_ms),
            end: Duration::ZERO,
            stream_id: 0x20,
            index_entry: IndexEntry::default(),
        }
    }

    #[test]
    fn end_times() {
        let mut units = vec![unit(1000, true), unit(2000, false), unit(2500, false),
                             unit(9000, false)];
        assign_end_times(&mut units);
        assert_eq!(units[0].end, Duration::from_millis(1000 + delay_to_millis(0x5a)));
        assert_eq!(units[1].end, Duration::from_millis(2499));
        assert_eq!(units[2].end, Duration::from_millis(7500));
        assert_eq!(units[3].end, Duration::from_millis(14000));
    }

    #[test]
    fn reassemble_split_spu() {
        let _ = env_logger::builder().is_test(true).try_init();
        let spu = spu(true);
        let mut input = packet(Some(90_000), 0x20, &spu[..5]);
        input.extend(vec![0xff; 30]);
        input.extend(packet(None, 0x20, &spu[5..]));
        input.extend(packet(Some(180_000), 0x20, &spu));

        let subs: Vec<_> = subtitles(&input, &[]).collect();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].start, Duration::from_secs(1));
        assert_eq!(subs[0].image.raw_data(), &spu[..]);
        assert_eq!(subs[0].end, Duration::from_millis(1000 + delay_to_millis(0x5a)));
        assert_eq!(subs[1].start, Duration::from_secs(2));
    }

    #[test]
    fn interrupted_spu_is_flushed() {
        let spu = spu(false);
        let mut input = packet(Some(90_000), 0x21, &spu[..8]);
        input.extend(packet(Some(180_000), 0x21, &spu));
        let subs: Vec<_> = subtitles(&input, &[]).collect();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].stream_id, 0x21);
        assert_eq!(subs[0].image.raw_data(), &spu[..8]);
        assert_eq!(subs[0].end, Duration::from_millis(1999));
        assert_eq!(subs[1].end, Duration::from_secs(7));
    }

    #[test]
    fn packets_from_other_streams_are_skipped() {
        let spu = spu(true);
        let mut input = packet(Some(0), 0x20, &spu[..6]);
        input.extend(packet(None, 0x22, &[0xaa; 9]));
        input.extend(packet(None, 0x20, &spu[6..]));
        let subs: Vec<_> = subtitles(&input, &[]).collect();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].image.raw_data(), &spu[..]);
    }

    #[test]
    fn start_time_falls_back_to_index() {
        let input = packet(None, 0x20, &spu(true));
        let index = [IndexEntry::new(Duration::from_millis(4321), 0)];
        let subs: Vec<_> = subtitles(&input, &index).collect();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].start, Duration::from_millis(4321));
        assert_eq!(subs[0].index_entry, index[0]);
    }

    #[test]
    fn too_short_spu_is_dropped() {
        let input = packet(Some(0), 0x20, &[0x00]);
        assert_eq!(subtitles(&input, &[]).count(), 0);
        assert_eq!(subtitles(&[], &[]).count(), 0);
    }
}
