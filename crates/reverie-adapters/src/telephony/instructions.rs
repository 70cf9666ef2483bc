//! Provider instruction documents
//!
//! The reply to an answer webhook (and the payload of a mid-call update) is
//! an XML document listing actions the provider executes in order: play a
//! hosted audio URL, speak text with a built-in voice, open a bidirectional
//! media stream, pause, redirect to another webhook, or hang up.

use xml::writer::{EventWriter, XmlEvent};

use crate::error::{AdapterError, Result};

/// One provider action.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Play audio hosted at a URL.
    Play { url: String },
    /// Speak text with the provider's built-in voice (TTS fallback).
    Say { text: String, voice: Option<String> },
    /// Open a bidirectional media stream to a `ws://`/`wss://` URL.
    OpenStream { url: String },
    /// Pause for whole seconds.
    Pause { seconds: u32 },
    /// Re-request instructions from another webhook URL.
    Redirect { url: String },
    /// Hang up the call.
    Hangup,
}

/// An ordered set of actions, rendered as one XML document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstructionSet {
    pub actions: Vec<Action>,
}

impl InstructionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn play(mut self, url: impl Into<String>) -> Self {
        self.actions.push(Action::Play { url: url.into() });
        self
    }

    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.actions.push(Action::Say {
            text: text.into(),
            voice: None,
        });
        self
    }

    pub fn say_with_voice(mut self, text: impl Into<String>, voice: impl Into<String>) -> Self {
        self.actions.push(Action::Say {
            text: text.into(),
            voice: Some(voice.into()),
        });
        self
    }

    pub fn open_stream(mut self, url: impl Into<String>) -> Self {
        self.actions.push(Action::OpenStream { url: url.into() });
        self
    }

    pub fn pause(mut self, seconds: u32) -> Self {
        self.actions.push(Action::Pause { seconds });
        self
    }

    pub fn redirect(mut self, url: impl Into<String>) -> Self {
        self.actions.push(Action::Redirect { url: url.into() });
        self
    }

    pub fn hangup(mut self) -> Self {
        self.actions.push(Action::Hangup);
        self
    }

    /// Whether the document ends the call.
    pub fn ends_call(&self) -> bool {
        self.actions.iter().any(|a| matches!(a, Action::Hangup))
    }

    /// Render the document. Stream URLs must be `ws://` or `wss://`.
    pub fn to_xml(&self) -> Result<String> {
        let w = Vec::new();
        let mut writer = EventWriter::new(w);

        write(&mut writer, XmlEvent::start_element("Response").into())?;

        for action in &self.actions {
            match action {
                Action::Play { url } => {
                    write(&mut writer, XmlEvent::start_element("Play").into())?;
                    write(&mut writer, XmlEvent::characters(url))?;
                    write(&mut writer, XmlEvent::end_element().name("Play").into())?;
                }
                Action::Say { text, voice } => {
                    let mut element = XmlEvent::start_element("Say");
                    if let Some(voice) = voice {
                        element = element.attr("voice", voice);
                    }
                    write(&mut writer, element.into())?;
                    write(&mut writer, XmlEvent::characters(text))?;
                    write(&mut writer, XmlEvent::end_element().name("Say").into())?;
                }
                Action::OpenStream { url } => {
                    if !url.starts_with("ws://") && !url.starts_with("wss://") {
                        return Err(AdapterError::permanent(format!(
                            "stream URL must be ws:// or wss://, got {url}"
                        )));
                    }
                    write(&mut writer, XmlEvent::start_element("Connect").into())?;
                    write(&mut writer, XmlEvent::start_element("Stream").attr("url", url).into())?;
                    write(&mut writer, XmlEvent::end_element().name("Stream").into())?;
                    write(&mut writer, XmlEvent::end_element().name("Connect").into())?;
                }
                Action::Pause { seconds } => {
                    let length = seconds.to_string();
                    write(
                        &mut writer,
                        XmlEvent::start_element("Pause").attr("length", &length).into(),
                    )?;
                    write(&mut writer, XmlEvent::end_element().name("Pause").into())?;
                }
                Action::Redirect { url } => {
                    write(&mut writer, XmlEvent::start_element("Redirect").into())?;
                    write(&mut writer, XmlEvent::characters(url))?;
                    write(&mut writer, XmlEvent::end_element().name("Redirect").into())?;
                }
                Action::Hangup => {
                    write(&mut writer, XmlEvent::start_element("Hangup").into())?;
                    write(&mut writer, XmlEvent::end_element().name("Hangup").into())?;
                }
            }
        }

        write(&mut writer, XmlEvent::end_element().name("Response").into())?;

        let buffer = writer.into_inner();
        String::from_utf8(buffer)
            .map_err(|e| AdapterError::permanent(format!("instruction document not utf-8: {e}")))
    }
}

fn write<W: std::io::Write>(writer: &mut EventWriter<W>, event: XmlEvent<'_>) -> Result<()> {
    writer
        .write(event)
        .map_err(|e| AdapterError::permanent(format!("xml write: {e}")))
}
