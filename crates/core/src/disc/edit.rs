//! Range arithmetic behind the group edits.
//!
//! Each function takes the current group list and derives a complete new
//! one, together with the track moves the device has to perform to match
//! it. Nothing here talks to a device, so a failed plan never leaves a
//! half-edited list behind.
//!
//! Track arguments are 0-based device indices, group bounds are 1-based
//! track numbers, and index 0 is always the disc title.

use crate::title::Group;
use crate::{NetMdError, Result};

/// One on-device "move track" command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackMove {
    pub from: u8,
    pub to: u8,
}

/// A planned structural edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub groups: Vec<Group>,
    pub moves: Vec<TrackMove>,
}

impl Edit {
    pub fn relabel(groups: Vec<Group>) -> Self {
        Self {
            groups,
            moves: Vec::new(),
        }
    }
}

/// Checks that `index` names a track group rather than the disc title.
fn check_group(groups: &[Group], index: usize) -> Result<()> {
    if index == 0 || index >= groups.len() {
        return Err(NetMdError::out_of_range("group", index, groups.len()));
    }
    Ok(())
}

fn track_index(number: u16) -> Result<u8> {
    u8::try_from(number).map_err(|_| NetMdError::out_of_range("track", usize::from(number), 256))
}

fn to_number(track: u8) -> u16 {
    u16::from(track) + 1
}

/// Shifts every non-empty track group except `skip` whose start satisfies
/// `pred`.
fn shift_where(groups: &mut [Group], skip: Option<usize>, delta: i32, pred: impl Fn(&Group) -> bool) {
    for (i, group) in groups.iter_mut().enumerate().skip(1) {
        if Some(i) != skip && !group.is_empty() && pred(group) {
            group.shift(delta);
        }
    }
}

/// Takes track `number` out of whichever group holds it and closes the gap.
fn release_track(groups: &mut [Group], number: u16) {
    let owner = groups
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, group)| group.contains(number))
        .map(|(i, _)| i);

    if let Some(owner) = owner {
        let group = &mut groups[owner];
        if group.track_count() <= 1 {
            group.start = 0;
            group.finish = 0;
        } else {
            group.finish -= 1;
        }
        tracing::debug!(owner, number, "released track from group");
    }
    shift_where(groups, owner, -1, |group| group.start > number);
}

/// Grows `target` by one track and returns the slot it now ends on.
fn claim_slot(groups: &mut [Group], target: usize, number: u16) -> u16 {
    let (start, finish) = (groups[target].start, groups[target].finish);
    if finish != 0 {
        groups[target].finish = finish + 1;
    } else if start == 0 {
        let floor = groups[1..target]
            .iter()
            .filter(|g| !g.is_empty())
            .map(Group::last)
            .max()
            .unwrap_or(0)
            + 1;
        let ceiling = groups[target + 1..]
            .iter()
            .filter(|g| !g.is_empty())
            .map(|g| g.start)
            .min();
        let slot = number.max(floor);
        let slot = ceiling.map_or(slot, |ceiling| slot.min(ceiling));
        groups[target].start = slot;
        groups[target].finish = slot;
    } else {
        groups[target].finish = start + 1;
    }
    groups[target].last()
}

/// Plans moving `track` into group `target`.
pub fn assign_track(groups: &[Group], track: u8, target: usize) -> Result<Edit> {
    check_group(groups, target)?;
    let number = to_number(track);
    let mut groups = groups.to_vec();

    release_track(&mut groups, number);
    let slot = claim_slot(&mut groups, target, number);
    for group in groups[target + 1..].iter_mut().filter(|g| !g.is_empty()) {
        group.shift(1);
    }

    let to = track_index(slot - 1)?;
    Ok(Edit {
        groups,
        moves: vec![TrackMove { from: track, to }],
    })
}

/// Plans relocating group `index` so its first track lands on `track`.
pub fn move_group(groups: &[Group], track: u8, index: usize) -> Result<Edit> {
    check_group(groups, index)?;
    let source = &groups[index];
    if source.start == 0 {
        return Err(NetMdError::EmptyGroup(index));
    }

    let len = source.track_count();
    let old_last = source.last();
    let from = source.start - 1;
    let to = u16::from(track);
    let new_start = to + 1;
    // Validates the far end of the block before anything is planned.
    track_index(to.saturating_add(len - 1))?;

    let mut groups = groups.to_vec();
    let mut moved = groups.remove(index);
    let span = i32::from(len);

    shift_where(&mut groups, None, -span, |g| g.start > old_last);
    if groups
        .iter()
        .skip(1)
        .any(|g| !g.is_empty() && g.start < new_start && new_start <= g.last())
    {
        return Err(NetMdError::out_of_range("track", usize::from(track), usize::from(old_last)));
    }
    shift_where(&mut groups, None, span, |g| g.start >= new_start);

    moved.start = new_start;
    if moved.finish != 0 {
        moved.finish = new_start + len - 1;
    }

    let position = groups
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, g)| !g.is_empty() && g.start > new_start)
        .map(|(i, _)| i)
        .unwrap_or_else(|| groups.iter().rposition(|g| !g.is_empty()).map_or(1, |i| i + 1).max(1));
    groups.insert(position, moved);

    let mut moves = Vec::with_capacity(usize::from(len));
    if to < from {
        for k in 0..len {
            moves.push(TrackMove {
                from: track_index(from + k)?,
                to: track_index(to + k)?,
            });
        }
    } else if to > from {
        let last = track_index(to.saturating_add(len - 1))?;
        let first = track_index(from)?;
        moves.extend((0..len).map(|_| TrackMove { from: first, to: last }));
    }

    Ok(Edit { groups, moves })
}

/// Drops group `index`. Tracks keep their numbers; only the label goes.
pub fn delete_group(groups: &[Group], index: usize) -> Result<Edit> {
    check_group(groups, index)?;
    let mut groups = groups.to_vec();
    groups.remove(index);
    Ok(Edit::relabel(groups))
}
