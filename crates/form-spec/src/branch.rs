use crate::error::FormError;
use crate::template::{FormField, Qnum};

/// Maps jump and loop-end qnums onto positions in the working sequence.
#[derive(Debug, Default, Clone, Copy)]
pub struct BranchResolver;

impl BranchResolver {
    /// Last field in `sequence` whose qnum equals `target`. Loop expansion
    /// repeats qnums; the most recent occurrence is authoritative.
    pub fn resolve_jump(
        &self,
        sequence: &[FormField],
        from: Qnum,
        target: Qnum,
    ) -> Result<usize, FormError> {
        sequence
            .iter()
            .rposition(|field| field.qnum == target)
            .ok_or(FormError::UnresolvedBranchTarget { target, from })
    }

    /// First field after `head_index` whose qnum equals the head's loop end.
    /// Searching forward keeps nested loop bodies inside their own iteration.
    pub fn resolve_loop_end(
        &self,
        sequence: &[FormField],
        head_index: usize,
        end: Qnum,
    ) -> Result<usize, FormError> {
        let head = sequence[head_index].qnum;
        sequence[head_index + 1..]
            .iter()
            .position(|field| field.qnum == end)
            .map(|offset| head_index + 1 + offset)
            .ok_or(FormError::UnresolvedLoopEnd { end, head })
    }
}
