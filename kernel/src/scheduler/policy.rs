/*
 * Scheduling Policies
 *
 * The six dispatch policies and their ready-queue disciplines. A policy
 * answers exactly two questions: which ready thread runs next, and
 * whether a newly readied thread preempts the running one. Round-Robin
 * preemption is not decided here at all; it rides on the quantum
 * interrupt the scheduler arms at dispatch.
 *
 * Selection is stable: among equal keys the thread readied first wins,
 * and a candidate merely equal to the running thread never preempts it.
 */

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::scheduler::thread::KThread;

/// Thread dispatch policy, fixed before the simulation starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
    /// First come, first served.
    Fcfs,
    /// FIFO with timer-driven preemption every quantum.
    RoundRobin,
    /// Highest priority first, run to completion or block.
    PriorityNonPreemptive,
    /// Highest priority first, preempted by strictly higher arrivals.
    PriorityPreemptive,
    /// Shortest estimated burst first, non-preemptive.
    SjfNonPreemptive,
    /// Shortest estimated burst first, preempted by strictly shorter arrivals.
    SjfPreemptive,
}

impl SchedPolicy {
    /// Short name for logging and configuration.
    pub fn name(self) -> &'static str {
        match self {
            SchedPolicy::Fcfs => "FCFS",
            SchedPolicy::RoundRobin => "RR",
            SchedPolicy::PriorityNonPreemptive => "PRIO_NP",
            SchedPolicy::PriorityPreemptive => "PRIO_P",
            SchedPolicy::SjfNonPreemptive => "SJF_NP",
            SchedPolicy::SjfPreemptive => "SJF_P",
        }
    }

    /// Whether dispatch arms a quantum interrupt.
    pub fn preempts_on_timer(self) -> bool {
        matches!(self, SchedPolicy::RoundRobin)
    }

    /// Should `candidate`, just made ready, take the CPU from `current`?
    ///
    /// Equality never preempts; the tie-break favors the running thread.
    /// Round-Robin deliberately answers no here: its preemption comes
    /// from the quantum interrupt, not from arrivals.
    pub fn should_switch(self, current: &KThread, candidate: &KThread) -> bool {
        match self {
            SchedPolicy::PriorityPreemptive => candidate.priority() < current.priority(),
            SchedPolicy::SjfPreemptive => candidate.time_left() < current.time_left(),
            _ => false,
        }
    }

    /// Remove and return the next thread to dispatch from `ready`.
    pub(crate) fn select_next(self, ready: &mut VecDeque<Arc<KThread>>) -> Option<Arc<KThread>> {
        match self {
            SchedPolicy::Fcfs | SchedPolicy::RoundRobin => ready.pop_front(),
            SchedPolicy::PriorityNonPreemptive | SchedPolicy::PriorityPreemptive => {
                take_min_by_key(ready, |t| t.priority() as u64)
            }
            SchedPolicy::SjfNonPreemptive | SchedPolicy::SjfPreemptive => {
                take_min_by_key(ready, |t| t.time_left())
            }
        }
    }
}

/// Remove the first thread with the minimum key; FIFO among equal keys.
fn take_min_by_key<K, F>(ready: &mut VecDeque<Arc<KThread>>, key: F) -> Option<Arc<KThread>>
where
    K: Ord,
    F: Fn(&KThread) -> K,
{
    let mut best: Option<(usize, K)> = None;
    for (idx, thread) in ready.iter().enumerate() {
        let k = key(thread);
        match &best {
            Some((_, min)) if *min <= k => {}
            _ => best = Some((idx, k)),
        }
    }
    best.and_then(|(idx, _)| ready.remove(idx))
}

/// A policy name that matches none of the six policies.
///
/// Reported to the caller before the simulation starts; a machine is
/// never built from an unrecognized policy.
#[derive(Debug, Clone)]
pub struct UnknownPolicy(pub String);

impl fmt::Display for UnknownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown scheduling policy '{}' (expected FCFS, RR, PRIO_NP, PRIO_P, SJF_NP or SJF_P)",
            self.0
        )
    }
}

impl std::error::Error for UnknownPolicy {}

impl FromStr for SchedPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FCFS" => Ok(SchedPolicy::Fcfs),
            "RR" => Ok(SchedPolicy::RoundRobin),
            "PRIO_NP" => Ok(SchedPolicy::PriorityNonPreemptive),
            "PRIO_P" => Ok(SchedPolicy::PriorityPreemptive),
            "SJF_NP" => Ok(SchedPolicy::SjfNonPreemptive),
            "SJF_P" => Ok(SchedPolicy::SjfPreemptive),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::thread::Priority;

    fn ready_of(threads: &[Arc<KThread>]) -> VecDeque<Arc<KThread>> {
        threads.iter().cloned().collect()
    }

    #[test]
    fn test_policy_names_round_trip() {
        for policy in [
            SchedPolicy::Fcfs,
            SchedPolicy::RoundRobin,
            SchedPolicy::PriorityNonPreemptive,
            SchedPolicy::PriorityPreemptive,
            SchedPolicy::SjfNonPreemptive,
            SchedPolicy::SjfPreemptive,
        ] {
            assert_eq!(policy.name().parse::<SchedPolicy>().unwrap(), policy);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            "sjf_p".parse::<SchedPolicy>().unwrap(),
            SchedPolicy::SjfPreemptive
        );
        assert_eq!("rr".parse::<SchedPolicy>().unwrap(), SchedPolicy::RoundRobin);
    }

    #[test]
    fn test_parse_rejects_unknown_names() {
        assert!("MLFQ".parse::<SchedPolicy>().is_err());
    }

    #[test]
    fn test_fcfs_selects_in_arrival_order() {
        let a = KThread::new("a");
        let b = KThread::new("b");
        let mut ready = ready_of(&[a.clone(), b]);
        let next = SchedPolicy::Fcfs.select_next(&mut ready).unwrap();
        assert!(Arc::ptr_eq(&next, &a));
    }

    #[test]
    fn test_priority_selects_numerically_smallest() {
        let low = KThread::with_priority("low", Priority::Min);
        let high = KThread::with_priority("high", Priority::Max);
        let norm = KThread::with_priority("norm", Priority::Norm);
        let mut ready = ready_of(&[low, high.clone(), norm]);
        let next = SchedPolicy::PriorityPreemptive
            .select_next(&mut ready)
            .unwrap();
        assert!(Arc::ptr_eq(&next, &high));
    }

    #[test]
    fn test_priority_ties_break_fifo() {
        let first = KThread::with_priority("first", Priority::Norm);
        let second = KThread::with_priority("second", Priority::Norm);
        let mut ready = ready_of(&[first.clone(), second]);
        let next = SchedPolicy::PriorityNonPreemptive
            .select_next(&mut ready)
            .unwrap();
        assert!(Arc::ptr_eq(&next, &first));
    }

    #[test]
    fn test_sjf_selects_shortest_burst() {
        let long = KThread::new("long");
        long.set_time_left(22);
        let short = KThread::new("short");
        short.set_time_left(2);
        let mid = KThread::new("mid");
        mid.set_time_left(7);
        let mut ready = ready_of(&[long, mid, short.clone()]);
        let next = SchedPolicy::SjfPreemptive.select_next(&mut ready).unwrap();
        assert!(Arc::ptr_eq(&next, &short));
    }

    #[test]
    fn test_equal_keys_never_preempt() {
        let current = KThread::with_priority("current", Priority::Norm);
        let same = KThread::with_priority("same", Priority::Norm);
        assert!(!SchedPolicy::PriorityPreemptive.should_switch(&current, &same));

        let a = KThread::new("a");
        a.set_time_left(5);
        let b = KThread::new("b");
        b.set_time_left(5);
        assert!(!SchedPolicy::SjfPreemptive.should_switch(&a, &b));
    }

    #[test]
    fn test_strictly_better_candidates_preempt() {
        let current = KThread::with_priority("current", Priority::Norm);
        let urgent = KThread::with_priority("urgent", Priority::Max);
        assert!(SchedPolicy::PriorityPreemptive.should_switch(&current, &urgent));
        assert!(!SchedPolicy::PriorityNonPreemptive.should_switch(&current, &urgent));
        assert!(!SchedPolicy::Fcfs.should_switch(&current, &urgent));
        assert!(!SchedPolicy::RoundRobin.should_switch(&current, &urgent));
    }
}
