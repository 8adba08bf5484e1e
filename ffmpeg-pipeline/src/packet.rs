use bytes::Bytes;
use ffmpeg_next::Rational;

/// One compressed packet together with the time base of the stream it was
/// read from. `Clone` deep-copies the payload, so every clone has its own
/// lifetime.
#[derive(Clone)]
pub struct RawPacket {
    packet: ffmpeg_next::codec::packet::Packet,
    time_base: Rational,
}

impl RawPacket {
    pub fn pts(&self) -> Option<i64> {
        self.packet.pts()
    }

    pub fn dts(&self) -> Option<i64> {
        self.packet.dts()
    }

    pub fn index(&self) -> usize {
        self.packet.stream()
    }

    pub fn data(&self) -> Bytes {
        self.packet
            .data()
            .map(Bytes::copy_from_slice)
            .unwrap_or_default()
    }

    pub fn is_key(&self) -> bool {
        self.packet.is_key()
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Shifts PTS and DTS back by `epoch`; missing timestamps stay missing.
    pub fn rebase(&mut self, epoch: i64) {
        let pts = self.packet.pts().map(|pts| pts - epoch);
        let dts = self.packet.dts().map(|dts| dts - epoch);
        self.packet.set_pts(pts);
        self.packet.set_dts(dts);
    }

    /// Rescales timestamps from `source` to `destination` and retags the packet.
    pub fn rescale_ts(&mut self, source: Rational, destination: Rational) {
        self.packet.rescale_ts(source, destination);
        self.time_base = destination;
    }

    pub fn get_mut(&mut self) -> &mut ffmpeg_next::codec::packet::Packet {
        &mut self.packet
    }

    pub fn packet(&self) -> &ffmpeg_next::codec::packet::Packet {
        &self.packet
    }
}

impl From<(ffmpeg_next::codec::packet::Packet, Rational)> for RawPacket {
    fn from((packet, time_base): (ffmpeg_next::codec::packet::Packet, Rational)) -> Self {
        Self { packet, time_base }
    }
}
