use crate::{ByteReader, ByteWriter, Error, NodeIndex, PoolHandle, SyncTrack};
use std::any::Any;
use std::sync::Arc;

/// Node-specific per-instance state. Implementors that carry state worth replaying override
/// `save`/`load`; both must produce and consume the same number of bytes.
pub trait UniqueData: Send + Sync + std::fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn save(&self, _writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn load(&mut self, _reader: &mut ByteReader<'_>) -> Result<(), Error> {
        Ok(())
    }
}

/// Value currently held by one output port.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum OutputValue {
    #[default]
    None,
    Pose(PoolHandle),
    Number(f32),
    Motion(NodeIndex),
}

/// Per-instance state every node carries, plus its optional node-specific part.
#[derive(Debug)]
pub struct NodeData {
    pub global_weight: f32,
    pub local_weight: f32,
    pub play_speed: f32,
    pub current_time: f32,
    pub duration: f32,
    pub pre_sync_time: f32,
    pub sync_index: Option<usize>,
    pub sync_track: Option<Arc<SyncTrack>>,
    pub has_error: bool,
    pub(crate) pose_ref_count: u32,
    pub(crate) ref_data_ref_count: u32,
    pub(crate) ref_data: Option<PoolHandle>,
    pub(crate) outputs: Vec<OutputValue>,
    pub(crate) custom: Option<Box<dyn UniqueData>>,
}

impl NodeData {
    pub fn new(num_outputs: usize, custom: Option<Box<dyn UniqueData>>) -> Self {
        Self {
            global_weight: 1.0,
            local_weight: 1.0,
            play_speed: 1.0,
            current_time: 0.0,
            duration: 0.0,
            pre_sync_time: 0.0,
            sync_index: None,
            sync_track: None,
            has_error: false,
            pose_ref_count: 0,
            ref_data_ref_count: 0,
            ref_data: None,
            outputs: vec![OutputValue::None; num_outputs],
            custom,
        }
    }

    pub fn pose_ref_count(&self) -> u32 {
        self.pose_ref_count
    }

    pub fn ref_data_ref_count(&self) -> u32 {
        self.ref_data_ref_count
    }

    pub fn outputs(&self) -> &[OutputValue] {
        &self.outputs
    }

    pub fn output(&self, port: usize) -> OutputValue {
        self.outputs.get(port).copied().unwrap_or_default()
    }

    pub fn set_output(&mut self, port: usize, value: OutputValue) {
        if let Some(slot) = self.outputs.get_mut(port) {
            *slot = value;
        }
    }

    pub fn custom(&self) -> Option<&dyn UniqueData> {
        self.custom.as_deref()
    }

    pub fn normalized_time(&self) -> f32 {
        if self.duration > f32::EPSILON {
            self.current_time / self.duration
        } else {
            0.0
        }
    }

    /// Timing fields a pass-through node inherits from the node feeding it.
    pub(crate) fn inherit_timing(&mut self, source: &NodeTiming) {
        self.duration = source.duration;
        self.current_time = source.current_time;
        self.pre_sync_time = source.pre_sync_time;
        self.sync_index = source.sync_index;
        self.sync_track = source.sync_track.clone();
    }

    pub(crate) fn timing(&self) -> NodeTiming {
        NodeTiming {
            duration: self.duration,
            current_time: self.current_time,
            pre_sync_time: self.pre_sync_time,
            sync_index: self.sync_index,
            sync_track: self.sync_track.clone(),
        }
    }

    /// Clears everything that only lives for one tick.
    pub(crate) fn reset_tick(&mut self) {
        self.pose_ref_count = 0;
        self.ref_data_ref_count = 0;
        self.ref_data = None;
        for output in &mut self.outputs {
            if matches!(output, OutputValue::Pose(_)) {
                *output = OutputValue::None;
            }
        }
    }

    /// Layout: weights, speed and timing, sync index, error flag, then the length-prefixed
    /// node-specific bytes.
    pub fn save(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_f32(self.global_weight)?;
        writer.write_f32(self.local_weight)?;
        writer.write_f32(self.play_speed)?;
        writer.write_f32(self.current_time)?;
        writer.write_f32(self.duration)?;
        writer.write_f32(self.pre_sync_time)?;
        writer.write_index(self.sync_index)?;
        writer.write_bool(self.has_error)?;

        let Some(custom) = &self.custom else {
            return writer.write_u32(0);
        };
        let mut counter = ByteWriter::counting();
        custom.save(&mut counter)?;
        writer.write_u32(counter.position() as u32)?;
        let start = writer.position();
        custom.save(writer)?;
        let written = writer.position() - start;
        if written != counter.position() {
            return Err(Error::ByteCountMismatch {
                expected: counter.position(),
                actual: written,
            });
        }
        Ok(())
    }

    pub fn load(&mut self, reader: &mut ByteReader<'_>) -> Result<(), Error> {
        self.global_weight = reader.read_f32()?;
        self.local_weight = reader.read_f32()?;
        self.play_speed = reader.read_f32()?;
        self.current_time = reader.read_f32()?;
        self.duration = reader.read_f32()?;
        self.pre_sync_time = reader.read_f32()?;
        self.sync_index = reader.read_index()?;
        self.has_error = reader.read_bool()?;

        let len = reader.read_u32()? as usize;
        let Some(custom) = &mut self.custom else {
            return reader.skip(len);
        };
        let start = reader.position();
        custom.load(reader)?;
        let consumed = reader.position() - start;
        if consumed != len {
            return Err(Error::ByteCountMismatch {
                expected: len,
                actual: consumed,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub(crate) struct NodeTiming {
    pub duration: f32,
    pub current_time: f32,
    pub pre_sync_time: f32,
    pub sync_index: Option<usize>,
    pub sync_track: Option<Arc<SyncTrack>>,
}
