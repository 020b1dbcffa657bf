use crate::{
    Charset, Converter, DecoderOptions, Direction, EncoderOptions, OpaqueEncoding, OutputForm,
    Profile, Result, WbxmlError, lookup_profile,
};
use clap::{Arg, ArgAction, ArgMatches, Command, ValueEnum, value_parser};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OpaqueArg {
    Base64,
    Hex,
}

impl From<OpaqueArg> for OpaqueEncoding {
    fn from(arg: OpaqueArg) -> Self {
        match arg {
            OpaqueArg::Base64 => OpaqueEncoding::Base64,
            OpaqueArg::Hex => OpaqueEncoding::Hex,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CharsetArg {
    #[value(name = "utf-8")]
    Utf8,
    #[value(name = "us-ascii")]
    UsAscii,
    #[value(name = "iso-8859-1")]
    Latin1,
}

impl From<CharsetArg> for Charset {
    fn from(arg: CharsetArg) -> Self {
        match arg {
            CharsetArg::Utf8 => Charset::Utf8,
            CharsetArg::UsAscii => Charset::UsAscii,
            CharsetArg::Latin1 => Charset::Latin1,
        }
    }
}

fn parse_language(name: &str) -> std::result::Result<&'static Profile, String> {
    lookup_profile(name).ok_or_else(|| format!("unknown language '{name}'"))
}

fn usage_error(message: &str) -> WbxmlError {
    WbxmlError::Usage(message.to_string())
}

pub struct Cli;

impl Cli {
    pub fn build_command() -> Command {
        Command::new("wbxml")
            .about("Converts between XML and WBXML (WAP Binary XML)")
            .long_about("Converts between XML and WBXML (WAP Binary XML) using the ActiveSync code pages.\n\nWhen invoked with the '-i' argument, the output of a successful conversion will overwrite the original input file. Input can be '-' to use stdin, and output can be '-' to use stdout.")
            .subcommand_required(true)
            .arg_required_else_help(true)
            .subcommand(
                Self::common_args(Command::new("encode").about("Convert XML to WBXML"))
                    .arg(
                        Arg::new("public-id")
                            .long("public-id")
                            .help("Write the language's public identifier instead of 'unknown'")
                            .action(ArgAction::SetTrue),
                    )
                    .arg(
                        Arg::new("string-table")
                            .long("string-table")
                            .help("Store unknown names and repeated text in a string table")
                            .action(ArgAction::SetTrue),
                    ),
            )
            .subcommand(
                Self::common_args(Command::new("decode").about("Convert WBXML to XML"))
                    .arg(
                        Arg::new("pretty")
                            .long("pretty")
                            .help("Indent element-only content")
                            .action(ArgAction::SetTrue),
                    )
                    .arg(
                        Arg::new("indent")
                            .long("indent")
                            .help("Spaces per level with --pretty")
                            .value_parser(value_parser!(usize))
                            .default_value("2"),
                    )
                    .arg(
                        Arg::new("charset")
                            .long("charset")
                            .help("Character set of the XML output")
                            .value_parser(value_parser!(CharsetArg))
                            .default_value("utf-8"),
                    ),
            )
    }

    fn common_args(command: Command) -> Command {
        command
            .arg(
                Arg::new("in-place")
                    .short('i')
                    .long("in-place")
                    .help("Overwrite input file with converted output")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("input")
                    .help("Input file path (use '-' for stdin)")
                    .required(true)
                    .index(1),
            )
            .arg(
                Arg::new("output")
                    .help("Output file path (use '-' for stdout)")
                    .index(2),
            )
            .arg(
                Arg::new("strip-whitespace")
                    .long("strip-whitespace")
                    .help("Drop whitespace-only text and trim other text")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("opaque")
                    .long("opaque")
                    .help("Text form of opaque data")
                    .value_parser(value_parser!(OpaqueArg))
                    .default_value("base64"),
            )
            .arg(
                Arg::new("language")
                    .long("language")
                    .help("WBXML language of the document")
                    .value_parser(parse_language)
                    .default_value("activesync"),
            )
    }

    pub fn run() -> Result<()> {
        let matches = Self::build_command().get_matches();
        Self::run_with_matches(matches)
    }

    pub fn run_with_matches(matches: ArgMatches) -> Result<()> {
        let Some((direction, sub)) = Self::direction(&matches) else {
            return Err(usage_error("Missing subcommand"));
        };
        let Some(input_path) = sub.get_one::<String>("input") else {
            return Err(usage_error("Missing input path"));
        };
        let output_path = sub.get_one::<String>("output");
        let in_place = sub.get_flag("in-place");

        if in_place && input_path == "-" {
            return Err(usage_error("Cannot use -i option with stdin input"));
        }

        let output_path = match output_path {
            Some(path) => path.clone(),
            None => {
                if in_place {
                    input_path.clone()
                } else {
                    "-".to_string()
                }
            }
        };

        let converter = Self::converter(direction, sub);
        match (input_path.as_str(), output_path.as_str()) {
            ("-", "-") => converter.convert_stdin_stdout(),
            ("-", output) => converter.convert_stdin_to_file(output),
            (input, "-") => converter.convert_file_to_stdout(input),
            (input, output) => converter.convert_file(input, output),
        }
    }

    fn direction(matches: &ArgMatches) -> Option<(Direction, &ArgMatches)> {
        match matches.subcommand()? {
            ("encode", sub) => Some((Direction::Encode, sub)),
            ("decode", sub) => Some((Direction::Decode, sub)),
            _ => None,
        }
    }

    /// Map the flags of an `encode` or `decode` invocation onto converter options
    fn converter(direction: Direction, sub: &ArgMatches) -> Converter {
        let defaults = Converter::new(direction);
        let language = sub
            .get_one::<&'static Profile>("language")
            .copied()
            .unwrap_or(defaults.encoder.language);
        let preserve_whitespace = !sub.get_flag("strip-whitespace");
        let opaque_encoding = sub
            .get_one::<OpaqueArg>("opaque")
            .copied()
            .map(OpaqueEncoding::from)
            .unwrap_or_default();

        match direction {
            Direction::Encode => defaults.with_encoder_options(EncoderOptions {
                language,
                include_public_id: sub.get_flag("public-id"),
                use_string_table: sub.get_flag("string-table"),
                preserve_whitespace,
                opaque_encoding,
                ..EncoderOptions::activesync()
            }),
            Direction::Decode => defaults.with_decoder_options(DecoderOptions {
                language,
                output_form: if sub.get_flag("pretty") {
                    OutputForm::Pretty
                } else {
                    OutputForm::Compact
                },
                indent: sub.get_one::<usize>("indent").copied().unwrap_or(2),
                charset: sub
                    .get_one::<CharsetArg>("charset")
                    .copied()
                    .map(Charset::from)
                    .unwrap_or_default(),
                preserve_whitespace,
                opaque_encoding,
                ..DecoderOptions::activesync()
            }),
        }
    }
}
