use crate::{DecoderOptions, EncoderOptions, Result, decode, encode};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use tracing::debug;

/// Which way a [`Converter`] translates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// XML to WBXML
    Encode,
    /// WBXML to XML
    Decode,
}

/// High-level converter between XML and WBXML
///
/// Both option sets are kept so that one value can be flipped between
/// directions; only the set matching `direction` is used.
#[derive(Debug, Clone)]
pub struct Converter {
    pub direction: Direction,
    pub encoder: EncoderOptions,
    pub decoder: DecoderOptions,
}

impl Converter {
    /// Converter with the ActiveSync settings for both directions
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            encoder: EncoderOptions::activesync(),
            decoder: DecoderOptions::activesync(),
        }
    }

    pub fn with_encoder_options(mut self, options: EncoderOptions) -> Self {
        self.encoder = options;
        self
    }

    pub fn with_decoder_options(mut self, options: DecoderOptions) -> Self {
        self.decoder = options;
        self
    }

    /// Convert everything from a reader to a writer
    ///
    /// The whole input is read before anything is written, so nothing
    /// reaches `writer` when the conversion fails.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wbxml::{Converter, Direction};
    /// use std::fs::File;
    ///
    /// let input = File::open("sync.wbxml").unwrap();
    /// let output = File::create("sync.xml").unwrap();
    /// Converter::new(Direction::Decode).convert(input, output).unwrap();
    /// ```
    pub fn convert<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<()> {
        let mut input = Vec::new();
        reader.read_to_end(&mut input)?;
        let output = self.convert_bytes(&input)?;
        writer.write_all(&output)?;
        writer.flush()?;
        Ok(())
    }

    /// Convert data that is already in memory
    ///
    /// # Examples
    ///
    /// ```
    /// use wbxml::{Converter, Direction};
    ///
    /// let wbxml = Converter::new(Direction::Encode)
    ///     .convert_bytes(br#"<Sync xmlns="AirSync"/>"#)
    ///     .unwrap();
    /// assert_eq!(wbxml, [0x03, 0x01, 0x6A, 0x00, 0x05]);
    /// ```
    pub fn convert_bytes(&self, input: &[u8]) -> Result<Vec<u8>> {
        match self.direction {
            Direction::Encode => encode(input, &self.encoder),
            Direction::Decode => decode(input, &self.decoder),
        }
    }

    /// Convert one file into another
    ///
    /// The output file is created only after a successful conversion, so
    /// `input_path` and `output_path` may name the same file.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wbxml::{Converter, Direction};
    ///
    /// Converter::new(Direction::Encode).convert_file("sync.xml", "sync.wbxml").unwrap();
    /// ```
    pub fn convert_file(&self, input_path: &str, output_path: &str) -> Result<()> {
        debug!(input = input_path, output = output_path, direction = ?self.direction, "converting file");
        let input = std::fs::read(input_path)?;
        let output = self.convert_bytes(&input)?;
        write_file(output_path, &output)
    }

    /// Convert stdin to stdout
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wbxml::{Converter, Direction};
    ///
    /// // cat sync.wbxml | wbxml decode - -
    /// Converter::new(Direction::Decode).convert_stdin_stdout().unwrap();
    /// ```
    pub fn convert_stdin_stdout(&self) -> Result<()> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        self.convert(stdin.lock(), BufWriter::new(stdout.lock()))
    }

    /// Convert stdin to a file
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wbxml::{Converter, Direction};
    ///
    /// // cat sync.xml | wbxml encode - sync.wbxml
    /// Converter::new(Direction::Encode).convert_stdin_to_file("sync.wbxml").unwrap();
    /// ```
    pub fn convert_stdin_to_file(&self, output_path: &str) -> Result<()> {
        let mut input = Vec::new();
        io::stdin().lock().read_to_end(&mut input)?;
        let output = self.convert_bytes(&input)?;
        write_file(output_path, &output)
    }

    /// Convert a file to stdout
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wbxml::{Converter, Direction};
    ///
    /// Converter::new(Direction::Decode).convert_file_to_stdout("sync.wbxml").unwrap();
    /// ```
    pub fn convert_file_to_stdout(&self, input_path: &str) -> Result<()> {
        let reader = BufReader::new(File::open(input_path)?);
        let stdout = io::stdout();
        self.convert(reader, BufWriter::new(stdout.lock()))
    }
}

fn write_file(path: &str, data: &[u8]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(data)?;
    writer.flush()?;
    Ok(())
}
