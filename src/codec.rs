//! Blocking packet codec for the E&C bus.
//!
//! This module provides [`PacketCodec`], which moves one [`Packet`] on or off
//! the bus by bit-banging a pair of `embedded-hal` pins. Every bit occupies a
//! fixed slot and the length of its active pulse carries the value:
//!
//! ```text
//!  "0"  ▔▔╲______________     111 µs active, 889 µs idle
//!  "1"  ▔▔▔▔▔▔▔▔▔╲_______     667 µs active, 333 µs idle
//! ```
//!
//! Receiving counts polling loops while the line is active and compares the
//! count against [`BusTiming::one_threshold`](crate::timer::BusTiming). The end
//! of a frame is the first gap longer than `max_loops`.
//!
//! Both directions busy-wait. Nothing is logged until a transfer is over, so
//! enabling `log` or `defmt` does not disturb pulse timing. With the
//! `critical-section` feature the timed part of each transfer runs inside
//! `critical_section::with`.
//!
//! ## Example
//!
//! ```rust
//! # use embedded_hal_mock::eh1::digital::{Mock as Pin, State as PinState, Transaction as PinTransaction};
//! # struct Spin;
//! # impl embedded_hal::delay::DelayNs for Spin { fn delay_ns(&mut self, _: u32) {} }
//! use ecbus::codec::PacketCodec;
//! use ecbus::config::BusConfig;
//! use ecbus::timer::BusTiming;
//!
//! let timing = BusTiming::default().with_start_loops(Some(1));
//! # let rx = Pin::new(&[PinTransaction::get(PinState::Low), PinTransaction::get(PinState::Low)]);
//! let mut codec: PacketCodec<Pin, Pin, Spin> =
//!     PacketCodec::new(rx, None, Spin, BusConfig::from_timing(timing));
//!
//! codec.read().unwrap();
//! if !codec.sent() {
//!     // Nobody talked.
//! }
//! # codec.rx.done();
//! ```

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin, PinState};
use nb::block;

use crate::config::BusConfig;
use crate::correction::Correction;
use crate::decoder::{DecoderState, FrameDecoder};
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::timer::IdleWatch;

/// Sends or receives one packet on the E&C bus.
///
/// A codec is bound to an input line, an optional output line and a delay
/// provider. It is populated once, either with [`set`](Self::set) and friends
/// before [`send`](Self::send), or by [`read`](Self::read), and then queried
/// through [`packet`](Self::packet).
///
/// ## Type Parameters
///
/// - `RX`: [`embedded_hal::digital::InputPin`] watching the bus
/// - `TX`: [`embedded_hal::digital::OutputPin`] driving the bus
/// - `D`: [`embedded_hal::delay::DelayNs`] used for pulse widths and optional
///   polling delays
///
/// ## Outcomes
///
/// Bus-level failures never show up as errors:
///
/// | Situation                       | `sent()` | `incomplete()` |
/// |---------------------------------|----------|----------------|
/// | nothing arrived / bus stuck     | `false`  | unchanged      |
/// | bus never idled before sending  | `false`  | unchanged      |
/// | frame repaired while decoding   | `true`   | `true`         |
///
/// Only a pin reporting a fault produces [`Error::Line`].
#[derive(Debug)]
pub struct PacketCodec<RX, TX, D>
where
    RX: InputPin,
    TX: OutputPin,
    D: DelayNs,
{
    /// Bus input pin
    pub rx: RX,
    /// Bus output pin. Without it the codec can only receive.
    pub tx: Option<TX>,
    delay: D,
    config: BusConfig,
    packet: Packet,
}

impl<RX, TX, D> PacketCodec<RX, TX, D>
where
    RX: InputPin,
    TX: OutputPin,
    D: DelayNs,
{
    /// Creates a codec holding an empty packet.
    pub fn new(rx: RX, tx: Option<TX>, delay: D, config: BusConfig) -> Self {
        Self {
            rx,
            tx,
            delay,
            config,
            packet: Packet::new(),
        }
    }

    /// The packet held by this codec.
    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    /// The configuration the codec was built with.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Whether the packet was actually sent on, or read off, the bus.
    pub fn sent(&self) -> bool {
        self.packet.sent()
    }

    /// Whether the received framing had to be repaired.
    pub fn incomplete(&self) -> bool {
        self.packet.incomplete()
    }

    /// See [`Packet::set`].
    pub fn set(&mut self, priority: u8, address: u8, byte0: u8, byte1: u8, byte2: u8) {
        self.packet.set(priority, address, byte0, byte1, byte2);
    }

    /// See [`Packet::set_data`].
    pub fn set_data(&mut self, priority: u8, address: u8, data: u32) {
        self.packet.set_data(priority, address, data);
    }

    /// See [`Packet::set_unique`].
    pub fn set_unique(&mut self, unique: u32) {
        self.packet.set_unique(unique);
    }

    /// Waits for a packet and decodes it into this codec.
    ///
    /// Returns once a frame has been read, or once the start budget ran out
    /// or the line stayed active too long. In the latter cases the packet is
    /// left untouched and [`sent`](Self::sent) stays `false`.
    pub fn read(&mut self) -> Result<()> {
        match self.receive() {
            Ok((packet, correction)) => {
                debug!(
                    "read {} payload bits, {} repair passes",
                    packet.bit_count(),
                    correction.passes
                );
                self.packet = packet;
                Ok(())
            }
            Err(err) if err.is_timeout() => {
                debug!("no frame: {}", err);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Transmits the packet held by this codec.
    ///
    /// Does nothing without an output pin or without payload bits. Waits for
    /// the bus to go idle first and gives up, leaving [`sent`](Self::sent)
    /// `false`, if it stays busy.
    pub fn send(&mut self) -> Result<()> {
        if self.packet.bit_count() == 0 || self.tx.is_none() {
            return Ok(());
        }

        let mut watch = IdleWatch::new(&self.config.timing);
        match block!(self.poll_idle(&mut watch)) {
            Ok(()) => {}
            Err(err) if err.is_timeout() => {
                warn!("bus never went idle, packet not sent");
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        let packet = self.packet;
        with_bus(|| -> Result<()> {
            for bit in packet.wire_bits() {
                self.send_bit(bit)?;
            }
            Ok(())
        })?;
        self.packet.mark_sent();
        debug!("sent {} payload bits", packet.bit_count());
        Ok(())
    }

    /// Sets the packet and sends it. Does nothing without an output pin.
    pub fn send_fields(
        &mut self,
        priority: u8,
        address: u8,
        byte0: u8,
        byte1: u8,
        byte2: u8,
    ) -> Result<()> {
        if self.tx.is_none() {
            return Ok(());
        }
        self.set(priority, address, byte0, byte1, byte2);
        self.send()
    }

    /// Gives back the pins and the delay provider.
    pub fn release(self) -> (RX, Option<TX>, D) {
        (self.rx, self.tx, self.delay)
    }

    fn receive(&mut self) -> Result<(Packet, Correction)> {
        self.await_start()?;
        let mut decoder = FrameDecoder::new();
        with_bus(|| self.read_frame(&mut decoder))?;
        decoder.finish().ok_or(Error::NoStart)
    }

    fn await_start(&mut self) -> Result<()> {
        let limit = self.config.timing.start_loops;
        let mut loops: u32 = 0;
        while !self.sample()? {
            loops = loops.saturating_add(1);
            if limit.is_some_and(|limit| loops > limit) {
                return Err(Error::NoStart);
            }
        }
        Ok(())
    }

    /// Reads from the start pulse, which has just gone active, to the end of
    /// the frame.
    fn read_frame(&mut self, decoder: &mut FrameDecoder) -> Result<()> {
        if self.measure_pulse()?.is_none() {
            return Err(Error::BusStuck);
        }
        decoder.start();
        while decoder.state() == DecoderState::ReadingBits {
            if !self.await_pulse()? {
                decoder.end_of_frame();
                break;
            }
            match self.measure_pulse()? {
                Some(loops) => {
                    let _ = decoder.push_pulse(loops, &self.config.timing);
                }
                None => decoder.abort(),
            }
        }
        Ok(())
    }

    /// Waits out an inter-bit gap. `false` once it exceeds `max_loops`.
    fn await_pulse(&mut self) -> Result<bool> {
        let mut loops: u32 = 0;
        while !self.sample()? {
            loops += 1;
            if loops > self.config.timing.max_loops {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Counts loops until an active pulse ends, the sample that detected it
    /// included. `None` if it outlasts `max_loops`.
    fn measure_pulse(&mut self) -> Result<Option<u32>> {
        let mut loops: u32 = 1;
        while self.sample()? {
            loops += 1;
            if loops > self.config.timing.max_loops {
                return Ok(None);
            }
        }
        Ok(Some(loops))
    }

    fn poll_idle(&mut self, watch: &mut IdleWatch) -> nb::Result<(), Error> {
        let active = self.sample()?;
        watch.poll(active)
    }

    fn send_bit(&mut self, bit: bool) -> Result<()> {
        let (active_us, idle_us) = self.config.timing.slot_us(bit);
        self.drive(true)?;
        self.delay.delay_us(active_us);
        self.drive(false)?;
        self.delay.delay_us(idle_us);
        Ok(())
    }

    /// Reads the bus once, then waits the polling delay if one is configured.
    fn sample(&mut self) -> Result<bool> {
        let high = self.rx.is_high().map_err(Error::line)?;
        if self.config.timing.poll_ns > 0 {
            self.delay.delay_ns(self.config.timing.poll_ns);
        }
        Ok(high != self.config.rx_inverted)
    }

    fn drive(&mut self, active: bool) -> Result<()> {
        let state = PinState::from(active != self.config.tx_inverted);
        if let Some(tx) = self.tx.as_mut() {
            tx.set_state(state).map_err(Error::line)?;
        }
        Ok(())
    }
}

#[cfg(feature = "critical-section")]
fn with_bus<R>(f: impl FnOnce() -> R) -> R {
    critical_section::with(|_| f())
}

#[cfg(not(feature = "critical-section"))]
fn with_bus<R>(f: impl FnOnce() -> R) -> R {
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::BusTiming;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };

    #[derive(Debug, Default)]
    struct RecordingDelay {
        us: Vec<u32>,
        ns: Vec<u32>,
    }

    impl DelayNs for RecordingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.ns.push(ns);
        }

        fn delay_us(&mut self, us: u32) {
            self.us.push(us);
        }
    }

    type Codec = PacketCodec<PinMock, PinMock, RecordingDelay>;

    /// `1` is three samples long, `0` one; gaps end after four.
    fn timing() -> BusTiming {
        let mut timing = BusTiming::default();
        timing.one_threshold = 3;
        timing.max_loops = 4;
        timing.wait_loops = 2;
        timing.start_loops = Some(2);
        timing
    }

    fn get(high: bool) -> PinTransaction {
        PinTransaction::get(if high { PinState::High } else { PinState::Low })
    }

    fn set(high: bool) -> PinTransaction {
        PinTransaction::set(if high { PinState::High } else { PinState::Low })
    }

    /// Input samples for a frame whose first bit is the start pulse.
    fn frame(bits: impl IntoIterator<Item = bool>, inverted: bool) -> Vec<PinTransaction> {
        let mut levels = vec![false];
        for (i, bit) in bits.into_iter().enumerate() {
            if i > 0 {
                levels.push(false);
            }
            let len = if bit { 3 } else { 1 };
            levels.extend(vec![true; len]);
            levels.push(false);
        }
        levels.extend(vec![false; 5]);
        levels.into_iter().map(|level| get(level != inverted)).collect()
    }

    fn receiver(rx: &[PinTransaction], config: BusConfig) -> Codec {
        PacketCodec::new(PinMock::new(rx), None, RecordingDelay::default(), config)
    }

    fn transmitter(rx: &[PinTransaction], tx: &[PinTransaction], config: BusConfig) -> Codec {
        PacketCodec::new(
            PinMock::new(rx),
            Some(PinMock::new(tx)),
            RecordingDelay::default(),
            config,
        )
    }

    fn finish(codec: Codec) -> RecordingDelay {
        let (mut rx, tx, delay) = codec.release();
        rx.done();
        if let Some(mut tx) = tx {
            tx.done();
        }
        delay
    }

    #[test]
    fn test_read_silent_bus_times_out() {
        let rx = [get(false), get(false), get(false)];
        let mut codec = receiver(&rx, BusConfig::from_timing(timing()));
        codec.read().unwrap();
        assert!(!codec.sent());
        assert_eq!(*codec.packet(), Packet::new());
        let _ = finish(codec);
    }

    #[test]
    fn test_read_stuck_bus() {
        let mut codec = receiver(&vec![get(true); 5], BusConfig::from_timing(timing()));
        codec.read().unwrap();
        assert!(!codec.sent());
        assert_eq!(*codec.packet(), Packet::new());
        let _ = finish(codec);
    }

    #[test]
    fn test_read_frame() {
        let mut expected = Packet::new();
        expected.set(1, 5, 0xAA, 0, 0);
        let rx = frame(expected.wire_bits(), false);
        let mut codec = receiver(&rx, BusConfig::from_timing(timing()));
        codec.read().unwrap();

        assert!(codec.sent());
        assert!(!codec.incomplete());
        assert_eq!(codec.packet().priority(), 1);
        assert_eq!(codec.packet().address(), 5);
        assert_eq!(codec.packet().byte(0), 0xAA);
        assert_eq!(codec.packet().bit_count(), 8);
        assert_eq!(codec.packet().parity(), expected.parity());
        let _ = finish(codec);
    }

    #[test]
    fn test_read_repairs_missing_bit() {
        let mut expected = Packet::new();
        expected.set(1, 3, 0x05, 0, 0);
        // Start pulse kept, first header bit lost.
        let bits = expected
            .wire_bits()
            .enumerate()
            .filter(|&(i, _)| i != 1)
            .map(|(_, bit)| bit);
        let mut codec = receiver(&frame(bits, false), BusConfig::from_timing(timing()));
        codec.read().unwrap();

        assert!(codec.sent());
        assert!(codec.incomplete());
        assert_eq!(codec.packet().header(), expected.header());
        assert_eq!(codec.packet().data(), expected.data());
        let _ = finish(codec);
    }

    #[test]
    fn test_read_inverted_input() {
        let mut expected = Packet::new();
        expected.set(2, 33, 0x3C, 0, 0);
        let config = BusConfig::from_timing(timing()).with_inversion(true, false);
        let mut codec = receiver(&frame(expected.wire_bits(), true), config);
        codec.read().unwrap();

        assert!(codec.sent());
        assert_eq!(codec.packet().unique(), expected.unique());
        let _ = finish(codec);
    }

    #[test]
    fn test_read_poll_delay() {
        let mut timing = timing();
        timing.poll_ns = 500;
        let mut codec = receiver(&vec![get(false); 3], BusConfig::from_timing(timing));
        codec.read().unwrap();
        let delay = finish(codec);
        assert_eq!(delay.ns, vec![500, 500, 500]);
        assert!(delay.us.is_empty());
    }

    #[test]
    fn test_send_emits_frame() {
        let wire = [
            true, // start
            true, false, true, false, true, false, false, false, // priority 1, address 5
            false, true, false, true, false, true, false, true, // 0xAA
            true, // parity
        ];
        let tx: Vec<_> = wire.iter().flat_map(|_| [set(true), set(false)]).collect();
        let rx = [get(false), get(false)];
        let mut codec = transmitter(&rx, &tx, BusConfig::from_timing(timing()));
        codec.set(1, 5, 0xAA, 0, 0);
        codec.send().unwrap();
        assert!(codec.sent());

        let delay = finish(codec);
        let expected: Vec<u32> = wire
            .iter()
            .flat_map(|&bit| if bit { [667, 333] } else { [111, 889] })
            .collect();
        assert_eq!(delay.us, expected);
    }

    #[test]
    fn test_send_waits_for_idle() {
        let rx = [get(false), get(true), get(false), get(false)];
        let tx: Vec<_> = (0..12).flat_map(|_| [set(true), set(false)]).collect();
        let mut codec = transmitter(&rx, &tx, BusConfig::from_timing(timing()));
        codec.set(0, 1, 0, 0, 0);
        codec.send().unwrap();
        assert!(codec.sent());
        let _ = finish(codec);
    }

    #[test]
    fn test_send_busy_bus_aborts() {
        let rx = vec![get(true); 5];
        let mut codec = transmitter(&rx, &[], BusConfig::from_timing(timing()));
        codec.set(1, 5, 0xAA, 0, 0);
        codec.send().unwrap();
        assert!(!codec.sent());
        let delay = finish(codec);
        assert!(delay.us.is_empty());
    }

    #[test]
    fn test_send_without_output_or_payload() {
        let mut codec = receiver(&[], BusConfig::from_timing(timing()));
        codec.set(1, 5, 0xAA, 0, 0);
        codec.send().unwrap();
        codec.send_fields(1, 5, 0xAA, 0, 0).unwrap();
        assert!(!codec.sent());
        let _ = finish(codec);

        let mut codec = transmitter(&[], &[], BusConfig::from_timing(timing()));
        codec.send().unwrap();
        assert!(!codec.sent());
        let _ = finish(codec);
    }

    #[test]
    fn test_send_fields_inverted_output() {
        // priority 2, address 0, payload 0b01: 1 + 8 + 2 + 1 bits
        let tx: Vec<_> = (0..12).flat_map(|_| [set(false), set(true)]).collect();
        let config = BusConfig::from_timing(timing()).with_inversion(false, true);
        let mut codec = transmitter(&[get(false), get(false)], &tx, config);
        codec.send_fields(2, 0, 1, 0, 0).unwrap();
        assert!(codec.sent());
        assert_eq!(codec.packet().bit_count(), 2);
        let _ = finish(codec);
    }

    #[test]
    fn test_send_then_read_back() {
        let mut sent = Packet::new();
        sent.set_unique(0x0012_34C6);
        let rx = frame(sent.wire_bits(), false);
        let mut codec = receiver(&rx, BusConfig::from_timing(timing()));
        codec.read().unwrap();
        assert_eq!(codec.packet().unique(), 0x0012_34C6);
        let _ = finish(codec);
    }
}
