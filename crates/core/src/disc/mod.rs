//! In-memory table of contents of the inserted disc.
//!
//! A [`Disc`] is read once per session from the raw title string and then
//! edited in place. Every structural edit is planned on a copy (see
//! [`edit`]), played out on the device, and only swapped in after the new
//! header has been written. A failing device call therefore leaves the
//! in-memory groups exactly as they were.

use crate::title::{self, Group};
use crate::{frame, NetMdDevice, NetMdError, Result, Transport};

pub mod edit;

pub use edit::{Edit, TrackMove};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disc {
    groups: Vec<Group>,
    header_length: usize,
}

impl Disc {
    /// Builds a disc from an already decoded group list.
    pub fn new(groups: Vec<Group>, header_length: usize) -> Self {
        Self {
            groups,
            header_length,
        }
    }

    /// Decodes the raw on-device title string.
    pub fn from_raw_title(raw: &[u8]) -> Result<Self> {
        let groups = title::parse(raw)?.into_groups();
        Ok(Self::new(groups, raw.len()))
    }

    /// Reads and decodes the disc title of the inserted disc.
    pub fn load<T: Transport>(device: &mut NetMdDevice<T>) -> Result<Self> {
        let raw = device.request_disc_title()?.unwrap_or_default();
        let disc = Self::from_raw_title(&raw)?;
        tracing::info!(
            title = disc.title(),
            groups = disc.groups.len() - 1,
            header_length = disc.header_length,
            "loaded disc"
        );
        Ok(disc)
    }

    /// Group list with the disc title at index 0.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn title(&self) -> &str {
        self.groups.first().map_or(title::UNTITLED, |g| g.name.as_str())
    }

    /// Byte length of the title string currently on the device.
    pub fn header_length(&self) -> usize {
        self.header_length
    }

    /// Highest track number any group refers to.
    pub fn track_count(&self) -> u16 {
        self.groups.iter().skip(1).map(Group::last).max().unwrap_or(0)
    }

    /// Index of the group holding the 0-based `track`, if any.
    pub fn group_of(&self, track: u8) -> Option<usize> {
        let number = u16::from(track) + 1;
        self.groups
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, g)| g.contains(number))
            .map(|(i, _)| i)
    }

    /// The title string as it would be written back.
    pub fn encode(&self) -> String {
        title::generate(&self.groups)
    }

    pub fn rename_group<T: Transport>(
        &mut self,
        device: &mut NetMdDevice<T>,
        index: usize,
        name: &str,
    ) -> Result<()> {
        if index >= self.groups.len() {
            return Err(NetMdError::out_of_range("group", index, self.groups.len()));
        }
        let mut groups = self.groups.clone();
        groups[index].name = name.to_string();
        self.commit(device, Edit::relabel(groups))
    }

    /// Appends an empty group and returns its index.
    pub fn create_group<T: Transport>(
        &mut self,
        device: &mut NetMdDevice<T>,
        name: &str,
    ) -> Result<usize> {
        let mut groups = self.groups.clone();
        groups.push(Group::new(name));
        self.commit(device, Edit::relabel(groups))?;
        Ok(self.groups.len() - 1)
    }

    /// Moves the 0-based `track` into group `group_index`.
    pub fn assign_track_to_group<T: Transport>(
        &mut self,
        device: &mut NetMdDevice<T>,
        track: u8,
        group_index: usize,
    ) -> Result<()> {
        let edit = edit::assign_track(&self.groups, track, group_index)?;
        self.commit(device, edit)
    }

    /// Relocates a group's track block so that it starts at `track`.
    pub fn move_group<T: Transport>(
        &mut self,
        device: &mut NetMdDevice<T>,
        track: u8,
        group_index: usize,
    ) -> Result<()> {
        let edit = edit::move_group(&self.groups, track, group_index)?;
        self.commit(device, edit)
    }

    /// Removes a group label. Its tracks stay where they are.
    pub fn delete_group<T: Transport>(
        &mut self,
        device: &mut NetMdDevice<T>,
        group_index: usize,
    ) -> Result<()> {
        let edit = edit::delete_group(&self.groups, group_index)?;
        self.commit(device, edit)
    }

    /// Plays `edit` out on the device and adopts it.
    fn commit<T: Transport>(&mut self, device: &mut NetMdDevice<T>, edit: Edit) -> Result<()> {
        let new_length = title::compute_length(&edit.groups);
        frame::length_byte(new_length)?;

        for TrackMove { from, to } in &edit.moves {
            device.move_track(*from, *to)?;
        }
        let header = title::generate(&edit.groups);
        device.write_disc_header(&header, self.header_length)?;
        tracing::debug!(%header, old_length = self.header_length, "wrote disc header");

        self.groups = edit.groups;
        self.header_length = new_length;
        Ok(())
    }
}
