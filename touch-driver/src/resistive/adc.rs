//! Bit-banged serial link to an ADS7846 / XPT2046 style touch ADC.

use embedded_hal::{
    delay::DelayNs,
    digital::{self, InputPin, OutputPin, PinState},
};

use super::Adc;

/// Worst-case conversion time after the command byte.
const CONVERSION_US: u32 = 6;

/// ADC on five GPIOs: clock, data out, data in, chip select, plus a delay.
///
/// Data is shifted on the rising clock edge. The result comes back as 16
/// clocked bits of which the top 12 carry the sample.
pub struct AdcBus<CLK, MOSI, MISO, CS, D> {
    clk: CLK,
    mosi: MOSI,
    miso: MISO,
    cs: CS,
    delay: D,
}

impl<CLK, MOSI, MISO, CS, D, E> AdcBus<CLK, MOSI, MISO, CS, D>
where
    CLK: OutputPin<Error = E>,
    MOSI: OutputPin<Error = E>,
    MISO: InputPin<Error = E>,
    CS: OutputPin<Error = E>,
    D: DelayNs,
{
    pub fn new(clk: CLK, mosi: MOSI, miso: MISO, cs: CS, delay: D) -> Self {
        Self {
            clk,
            mosi,
            miso,
            cs,
            delay,
        }
    }

    pub fn release(self) -> (CLK, MOSI, MISO, CS, D) {
        (self.clk, self.mosi, self.miso, self.cs, self.delay)
    }

    fn write_command(&mut self, mut command: u8) -> Result<(), E> {
        for _ in 0..8 {
            self.mosi.set_state(PinState::from(command & 0x80 != 0))?;
            command <<= 1;
            self.clk.set_low()?;
            self.delay.delay_us(1);
            self.clk.set_high()?;
        }
        Ok(())
    }
}

impl<CLK, MOSI, MISO, CS, D, E> Adc for AdcBus<CLK, MOSI, MISO, CS, D>
where
    CLK: OutputPin<Error = E>,
    MOSI: OutputPin<Error = E>,
    MISO: InputPin<Error = E>,
    CS: OutputPin<Error = E>,
    D: DelayNs,
    E: digital::Error,
{
    type Error = E;

    fn convert(&mut self, command: u8) -> Result<u16, E> {
        self.clk.set_low()?;
        self.mosi.set_low()?;
        self.cs.set_low()?;

        self.write_command(command)?;
        self.delay.delay_us(CONVERSION_US);

        // One pulse to clear BUSY.
        self.clk.set_low()?;
        self.delay.delay_us(1);
        self.clk.set_high()?;
        self.delay.delay_us(1);
        self.clk.set_low()?;

        let mut sample: u16 = 0;
        for _ in 0..16 {
            sample <<= 1;
            self.clk.set_low()?;
            self.delay.delay_us(1);
            self.clk.set_high()?;
            if self.miso.is_high()? {
                sample += 1;
            }
        }

        self.cs.set_high()?;
        Ok(sample >> 4)
    }
}
