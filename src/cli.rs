//! Interactive command-line session
//!
//! Prompts for a backend and a voice, then speaks each line typed until
//! `quit` or end of input. Speak failures are printed and the loop goes on.

use crate::speech::{BackendKind, Provider, ProviderFactory, VoiceRequest};
use crate::Result;
use log::{error, info};
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Choices given on the command line instead of at the prompts
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub backend: Option<BackendKind>,
    pub voice: Option<String>,
    pub reference: Option<PathBuf>,
}

/// Read one line without its terminator; `None` at end of input
fn read_line<R: BufRead>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Ask for a backend until a valid choice is made
pub fn select_backend<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> Result<Option<BackendKind>> {
    loop {
        writeln!(output, "\nAvailable TTS Systems:")?;
        for (idx, kind) in BackendKind::ALL.iter().enumerate() {
            writeln!(output, "{}. {}", idx + 1, kind.label())?;
        }
        write!(output, "Choose TTS type (1-3): ")?;
        output.flush()?;

        let Some(choice) = read_line(input)? else {
            return Ok(None);
        };
        match choice.trim() {
            digit @ ("1" | "2" | "3") => return Ok(Some(digit.parse()?)),
            _ => writeln!(output, "Invalid choice. Please enter 1, 2, or 3.")?,
        }
    }
}

/// Ask for a voice by its 1-based index
///
/// Returns `None` without prompting when there are no voices.
pub fn select_voice<R: BufRead, W: Write>(
    voices: &[String],
    input: &mut R,
    output: &mut W,
) -> Result<Option<String>> {
    if voices.is_empty() {
        return Ok(None);
    }

    writeln!(output, "\nAvailable voices:")?;
    for (idx, voice) in voices.iter().enumerate() {
        writeln!(output, "{}. {}", idx + 1, voice)?;
    }

    loop {
        write!(output, "Select voice (1-{}): ", voices.len())?;
        output.flush()?;

        let Some(choice) = read_line(input)? else {
            return Ok(None);
        };
        if let Ok(n) = choice.trim().parse::<usize>() {
            if (1..=voices.len()).contains(&n) {
                return Ok(Some(voices[n - 1].clone()));
            }
        }
        writeln!(output, "Invalid choice. Please try again.")?;
    }
}

/// Speak lines until `quit` or end of input; returns how many were spoken
pub fn speak_loop<R: BufRead, W: Write>(
    provider: &mut dyn Provider,
    input: &mut R,
    output: &mut W,
) -> Result<usize> {
    let mut spoken = 0;
    loop {
        write!(output, "\nEnter text to speak (or 'quit' to exit): ")?;
        output.flush()?;

        let Some(text) = read_line(input)? else {
            break;
        };
        if text.trim().eq_ignore_ascii_case("quit") {
            break;
        }

        match provider.speak(&text) {
            Ok(()) => spoken += 1,
            Err(e) => {
                error!("Speak failed: {}", e);
                writeln!(output, "Error: {}", e)?;
            }
        }
    }
    Ok(spoken)
}

/// Run a full interactive session
pub fn run<R: BufRead, W: Write>(
    factory: &ProviderFactory,
    options: CliOptions,
    input: &mut R,
    output: &mut W,
) -> Result<()> {
    let kind = match options.backend {
        Some(kind) => kind,
        None => match select_backend(input, output)? {
            Some(kind) => kind,
            None => return Ok(()),
        },
    };

    let voice = match options.voice {
        Some(voice) => Some(voice),
        None => {
            let voices = factory.list_voices(kind)?;
            select_voice(&voices, input, output)?
        }
    };

    let request = VoiceRequest {
        voice_name: voice.clone(),
        reference_audio: options.reference,
    };
    let mut provider = factory.initialize(kind, &request)?;

    writeln!(output, "\nTTS System ready!")?;
    writeln!(output, "Using: {} TTS", kind.as_str().to_uppercase())?;
    if let Some(voice) = &voice {
        writeln!(output, "Voice: {}", voice)?;
    }

    let spoken = speak_loop(provider.as_mut(), input, output)?;
    info!("Session ended after {} utterances", spoken);
    Ok(())
}
