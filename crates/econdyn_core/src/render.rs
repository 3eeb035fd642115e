//! Rendering capability handed to the sweep harness.

use crate::params::ParameterSet;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub points: Vec<[f64; 2]>,
}

impl Series {
    pub fn new(name: &str, points: Vec<[f64; 2]>) -> Self {
        Self {
            name: name.to_string(),
            points,
        }
    }
}

/// One frame: the line plots for a single parameter setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plot {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub parameters: ParameterSet,
    pub series: Vec<Series>,
}

/// Draws plots. Fire-and-forget: implementations deal with their own
/// failures and never report back to the harness.
pub trait Renderer {
    fn render(&mut self, plot: &Plot);
}

impl<R: Renderer + ?Sized> Renderer for &mut R {
    fn render(&mut self, plot: &Plot) {
        (**self).render(plot);
    }
}

/// Keeps every frame in memory.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub frames: Vec<Plot>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&Plot> {
        self.frames.last()
    }
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, plot: &Plot) {
        self.frames.push(plot.clone());
    }
}

/// Writes each frame as one line of JSON.
pub struct JsonLinesRenderer<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Renderer for JsonLinesRenderer<W> {
    fn render(&mut self, plot: &Plot) {
        let written = serde_json::to_writer(&mut self.writer, plot)
            .map_err(std::io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"))
            .and_then(|()| self.writer.flush());
        if let Err(err) = written {
            warn!(%err, title = %plot.title, "failed to write plot frame");
        }
    }
}
