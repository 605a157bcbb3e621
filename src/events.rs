use serde_derive::{Deserialize, Serialize};

use crate::{Alpha, IndexType, NodeIndex, StringId, ALPHA_ONE, ALPHA_ZERO};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateEventType {
    Entry,
    FullyInState,
    Exit,
    Timed,
}

/// Handle into the event track of the source clip. Sampled events never own
/// the authored event data.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct AnimationEventRef(pub IndexType);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampledEventPayload {
    Animation {
        event: AnimationEventRef,
        percentage_through: Alpha,
    },
    State {
        id: StringId,
        event_type: StateEventType,
    },
}

/// A single event recorded during one graph update. Position in the owning
/// buffer is stable until the buffer is cleared; blend operations only touch
/// the weight and the branch/ignored flags.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledEvent {
    weight: Alpha,
    source_node: Option<NodeIndex>,
    from_active_branch: bool,
    ignored: bool,
    payload: SampledEventPayload,
}

impl SampledEvent {
    pub fn weight(&self) -> Alpha {
        self.weight
    }

    pub fn set_weight(&mut self, weight: Alpha) {
        self.weight = weight;
    }

    pub fn source_node(&self) -> Option<NodeIndex> {
        self.source_node
    }

    pub fn is_from_active_branch(&self) -> bool {
        self.from_active_branch
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn payload(&self) -> &SampledEventPayload {
        &self.payload
    }

    pub fn is_state_event(&self) -> bool {
        matches!(self.payload, SampledEventPayload::State { .. })
    }

    pub fn animation_event(&self) -> Option<AnimationEventRef> {
        match self.payload {
            SampledEventPayload::Animation { event, .. } => Some(event),
            SampledEventPayload::State { .. } => None,
        }
    }

    pub fn percentage_through(&self) -> Option<Alpha> {
        match self.payload {
            SampledEventPayload::Animation {
                percentage_through, ..
            } => Some(percentage_through),
            SampledEventPayload::State { .. } => None,
        }
    }

    pub fn state_event_id(&self) -> Option<&StringId> {
        match &self.payload {
            SampledEventPayload::State { id, .. } => Some(id),
            SampledEventPayload::Animation { .. } => None,
        }
    }

    pub fn state_event_type(&self) -> Option<StateEventType> {
        match self.payload {
            SampledEventPayload::State { event_type, .. } => Some(event_type),
            SampledEventPayload::Animation { .. } => None,
        }
    }
}

/// Half-open `[start, end)` span of buffer indices. Only meaningful against
/// the buffer generation it was issued from; ranges do not survive
/// [`SampledEventsBuffer::clear`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampledEventRange {
    pub start: IndexType,
    pub end: IndexType,
}

impl SampledEventRange {
    pub fn new(start: IndexType, end: IndexType) -> Self {
        assert!(end >= start, "inverted sampled event range");
        Self { start, end }
    }

    pub fn empty_at(index: IndexType) -> Self {
        Self {
            start: index,
            end: index,
        }
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Append-only buffer of events sampled during one graph update. Cleared once
/// per frame by the owning graph instance; a single writer mutates it during
/// synchronous evaluation.
///
/// Blends never remove or reorder events. A branch that loses a blend keeps
/// its events in place with zeroed weights so every range issued to sibling
/// computations stays dereferenceable while the blend tree folds back up.
#[derive(Debug, Default, Clone)]
pub struct SampledEventsBuffer {
    events: Vec<SampledEvent>,
    anim_events_sampled: usize,
    state_events_sampled: usize,
}

impl SampledEventsBuffer {
    pub fn clear(&mut self) {
        self.events.clear();
        self.anim_events_sampled = 0;
        self.state_events_sampled = 0;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn num_animation_events_sampled(&self) -> usize {
        self.anim_events_sampled
    }

    pub fn num_state_events_sampled(&self) -> usize {
        self.state_events_sampled
    }

    pub fn events(&self) -> &[SampledEvent] {
        &self.events
    }

    pub fn full_range(&self) -> SampledEventRange {
        SampledEventRange::new(0, self.events.len() as IndexType)
    }

    /// True for any span that lies within the buffer, including the empty
    /// sentinel on an empty buffer. Every range-consuming operation checks
    /// this first and treats a failure as a caller defect.
    pub fn is_valid_range(&self, range: SampledEventRange) -> bool {
        range.start <= range.end && (range.end as usize) <= self.events.len()
    }

    pub fn events_in_range(&self, range: SampledEventRange) -> &[SampledEvent] {
        assert!(self.is_valid_range(range), "invalid sampled event range");
        &self.events[range.start as usize..range.end as usize]
    }

    fn events_in_range_mut(&mut self, range: SampledEventRange) -> &mut [SampledEvent] {
        assert!(self.is_valid_range(range), "invalid sampled event range");
        &mut self.events[range.start as usize..range.end as usize]
    }

    fn push_event(&mut self, event: SampledEvent) -> &mut SampledEvent {
        assert!(
            self.events.len() < IndexType::MAX as usize,
            "sampled event capacity exceeded"
        );
        self.events.push(event);
        self.events.last_mut().expect("Non empty")
    }

    /// The returned reference is only usable until the next append; the
    /// event's index stays stable until [`Self::clear`].
    pub fn emplace_animation_event(
        &mut self,
        source_node: Option<NodeIndex>,
        event: AnimationEventRef,
        percentage_through: Alpha,
        from_active_branch: bool,
    ) -> &mut SampledEvent {
        self.anim_events_sampled += 1;
        self.push_event(SampledEvent {
            weight: ALPHA_ONE,
            source_node,
            from_active_branch,
            ignored: false,
            payload: SampledEventPayload::Animation {
                event,
                percentage_through,
            },
        })
    }

    pub fn emplace_state_event(
        &mut self,
        source_node: Option<NodeIndex>,
        event_type: StateEventType,
        id: StringId,
        from_active_branch: bool,
    ) -> &mut SampledEvent {
        self.state_events_sampled += 1;
        self.push_event(SampledEvent {
            weight: ALPHA_ONE,
            source_node,
            from_active_branch,
            ignored: false,
            payload: SampledEventPayload::State { id, event_type },
        })
    }

    pub fn update_weights(&mut self, range: SampledEventRange, multiplier: Alpha) {
        for event in self.events_in_range_mut(range) {
            event.weight *= multiplier;
        }
    }

    pub fn mark_events(&mut self, range: SampledEventRange, ignored: bool, from_active_branch: bool) {
        for event in self.events_in_range_mut(range) {
            event.ignored = ignored;
            event.from_active_branch = from_active_branch;
        }
    }

    pub fn mark_events_as_ignored(&mut self, range: SampledEventRange) {
        for event in self.events_in_range_mut(range) {
            event.ignored = true;
        }
    }

    pub fn mark_events_as_from_inactive_branch(&mut self, range: SampledEventRange) {
        for event in self.events_in_range_mut(range) {
            event.from_active_branch = false;
        }
    }

    pub fn mark_only_state_events_as_ignored(&mut self, range: SampledEventRange) {
        for event in self.events_in_range_mut(range) {
            if event.is_state_event() {
                event.ignored = true;
            }
        }
    }

    /// Merge two contiguous sibling ranges into one. The contiguity
    /// requirement encodes that `range1`'s events were appended directly
    /// after `range0`'s, which is how two sources lay out their events
    /// before a parent blends them.
    ///
    /// At the exact endpoints one side wins outright and the loser's weights
    /// are zeroed in place. Anywhere in between, `range0` is scaled by
    /// `blend_weight` and `range1` by its inverse, and the result is the
    /// union of both spans.
    pub fn blend_event_ranges(
        &mut self,
        range0: SampledEventRange,
        range1: SampledEventRange,
        blend_weight: Alpha,
    ) -> SampledEventRange {
        assert!(self.is_valid_range(range0), "invalid sampled event range");
        assert!(self.is_valid_range(range1), "invalid sampled event range");
        assert!(
            range0.end == range1.start,
            "blended sampled event ranges must be contiguous"
        );

        if blend_weight == ALPHA_ZERO {
            self.update_weights(range1, ALPHA_ZERO);
            return range0;
        }

        if blend_weight == ALPHA_ONE {
            self.update_weights(range0, ALPHA_ZERO);
            return range1;
        }

        self.update_weights(range0, blend_weight);
        self.update_weights(range1, blend_weight.inverse());

        let result = if !range0.is_empty() && !range1.is_empty() {
            SampledEventRange::new(range0.start, range1.end)
        } else if !range0.is_empty() {
            range0
        } else if !range1.is_empty() {
            range1
        } else {
            SampledEventRange::empty_at(self.events.len() as IndexType)
        };

        debug_assert!(self.is_valid_range(result));
        result
    }

    /// Bulk-copy another buffer's events onto the end of this one, preserving
    /// relative order. Used when a child graph's sampled events are folded
    /// into its parent. Returns the newly appended span.
    pub fn append_buffer(&mut self, other: &SampledEventsBuffer) -> SampledEventRange {
        assert!(
            self.events.len() + other.events.len() <= IndexType::MAX as usize,
            "sampled event capacity exceeded"
        );
        let start = self.events.len() as IndexType;
        self.events.extend_from_slice(&other.events);
        self.anim_events_sampled += other.anim_events_sampled;
        self.state_events_sampled += other.state_events_sampled;
        SampledEventRange::new(start, self.events.len() as IndexType)
    }

    pub fn contains_state_event(&self, id: &StringId, from_active_branch_only: bool) -> bool {
        self.contains_state_event_in_range(self.full_range(), id, from_active_branch_only)
    }

    pub fn contains_state_event_in_range(
        &self,
        range: SampledEventRange,
        id: &StringId,
        from_active_branch_only: bool,
    ) -> bool {
        self.find_state_event(range, id, None, from_active_branch_only)
    }

    pub fn contains_specific_state_event(
        &self,
        id: &StringId,
        event_type: StateEventType,
        from_active_branch_only: bool,
    ) -> bool {
        self.find_state_event(self.full_range(), id, Some(event_type), from_active_branch_only)
    }

    pub fn contains_specific_state_event_in_range(
        &self,
        range: SampledEventRange,
        id: &StringId,
        event_type: StateEventType,
        from_active_branch_only: bool,
    ) -> bool {
        self.find_state_event(range, id, Some(event_type), from_active_branch_only)
    }

    fn find_state_event(
        &self,
        range: SampledEventRange,
        id: &StringId,
        event_type: Option<StateEventType>,
        from_active_branch_only: bool,
    ) -> bool {
        self.events_in_range(range).iter().any(|event| {
            if event.is_ignored() || (from_active_branch_only && !event.is_from_active_branch()) {
                return false;
            }
            match &event.payload {
                SampledEventPayload::State {
                    id: event_id,
                    event_type: sampled_type,
                } => event_id == id && event_type.map_or(true, |t| t == *sampled_type),
                SampledEventPayload::Animation { .. } => false,
            }
        })
    }
}
