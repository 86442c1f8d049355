//! Mapping of flat work items onto streams, teams and threads
//!
//! A launch over `num_items` flat items is split into one partition per team
//! of every stream. Partition boundaries are rounded up to a multiple of the
//! warp size, so that no warp straddles two teams, except for the end of the
//! very last partition which is exactly `num_items`.

use std::{iter::StepBy, num::NonZeroU32, ops::Range};

/// Number of threads that the device schedules together
pub const WARP_SIZE: usize = 32;

/// Shape of a launch, identical on every stream
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct LaunchGeometry {
    /// Number of flat work items across all streams
    pub num_items: usize,

    /// Number of streams that the work is spread over
    pub num_streams: usize,

    /// Number of teams launched on each stream
    pub teams_per_stream: usize,

    /// Number of threads per team
    pub threads_per_team: usize,
}
//
impl LaunchGeometry {
    /// Size a launch of `num_items` over `num_streams` streams
    ///
    /// The requested team count and size are shrunk when a stream's share of
    /// the work could not keep them busy. At least one team of one thread is
    /// launched per stream, even if there are fewer items than streams.
    pub fn new(
        num_items: usize,
        num_streams: usize,
        threads_per_block: NonZeroU32,
        blocks_per_loop: NonZeroU32,
    ) -> Self {
        assert!(num_streams > 0, "launches need at least one stream");
        let per_stream = num_items / num_streams;
        let threads_per_block = threads_per_block.get() as usize;
        let max_threads = threads_per_block.saturating_mul(blocks_per_loop.get() as usize);
        let actual_threads = per_stream.min(max_threads).max(1);
        Self {
            num_items,
            num_streams,
            teams_per_stream: actual_threads.div_ceil(threads_per_block),
            threads_per_team: per_stream.min(threads_per_block).max(1),
        }
    }

    /// Total number of partitions, i.e. of teams across all streams
    pub fn num_partitions(&self) -> usize {
        self.teams_per_stream * self.num_streams
    }

    /// Partition processed by team `team` of stream `stream`
    pub fn partition(&self, stream: usize, team: usize) -> WarpPartition {
        debug_assert!(stream < self.num_streams && team < self.teams_per_stream);
        partition_bounds(
            self.num_items,
            stream * self.teams_per_stream + team,
            self.num_partitions(),
        )
    }

    /// Flat items processed by thread `thread` of team `team` of stream
    /// `stream`
    ///
    /// Threads of a team stride over the team's partition, so consecutive
    /// threads process consecutive items.
    pub fn thread_items(&self, stream: usize, team: usize, thread: usize) -> StepBy<Range<usize>> {
        let items = self.partition(stream, team).clamped(self.num_items);
        (items.start + thread..items.end).step_by(self.threads_per_team)
    }
}

/// Raw boundaries of a partition of the flat item space
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct WarpPartition {
    /// First item
    pub start: usize,

    /// One past the last item
    pub end: usize,
}
//
impl WarpPartition {
    /// Items of this partition that actually exist
    ///
    /// When there are few items per partition, warp rounding can push raw
    /// boundaries past the end of the item space, and a partition can end up
    /// smaller than a warp or empty.
    pub fn clamped(&self, num_items: usize) -> Range<usize> {
        let end = self.end.min(num_items);
        self.start.min(end)..end
    }
}

/// Boundaries of partition `partition` out of `num_partitions` equal shares
/// of `num_items` items
pub fn partition_bounds(
    num_items: usize,
    partition: usize,
    num_partitions: usize,
) -> WarpPartition {
    assert!(partition < num_partitions, "partition {partition} is out of range");
    let boundary = |p: usize| {
        let estimate = (num_items as u128 * p as u128 / num_partitions as u128) as usize;
        estimate.next_multiple_of(WARP_SIZE)
    };
    WarpPartition {
        start: boundary(partition),
        end: if partition + 1 == num_partitions {
            num_items
        } else {
            boundary(partition + 1)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nz(x: u32) -> NonZeroU32 {
        NonZeroU32::new(x).unwrap()
    }

    #[test]
    fn warp_alignment() {
        for num_items in [1, 2, 31, 32, 33, 100, 1000, 4097, 65536, 1_000_003] {
            for num_partitions in 1..=40 {
                let bounds = (0..num_partitions)
                    .map(|p| partition_bounds(num_items, p, num_partitions))
                    .collect::<Vec<_>>();
                for (p, bound) in bounds.iter().enumerate() {
                    assert_eq!(bound.start % WARP_SIZE, 0);
                    if p + 1 < num_partitions {
                        assert_eq!(bound.end % WARP_SIZE, 0);
                        assert_eq!(bound.end, bounds[p + 1].start);
                    } else {
                        assert_eq!(bound.end, num_items);
                    }
                }
                assert_eq!(bounds[0].start, 0);
            }
        }
    }

    #[test]
    fn launch_sizing() {
        let big = LaunchGeometry::new(1 << 20, 2, nz(256), nz(4));
        assert_eq!(big.teams_per_stream, 4);
        assert_eq!(big.threads_per_team, 256);
        assert_eq!(big.num_partitions(), 8);

        let small = LaunchGeometry::new(300, 2, nz(256), nz(4));
        assert_eq!(small.teams_per_stream, 1);
        assert_eq!(small.threads_per_team, 150);

        let medium = LaunchGeometry::new(2000, 2, nz(256), nz(8));
        assert_eq!(medium.teams_per_stream, 4);
        assert_eq!(medium.threads_per_team, 256);

        let tiny = LaunchGeometry::new(2, 3, nz(256), nz(1));
        assert_eq!(tiny.teams_per_stream, 1);
        assert_eq!(tiny.threads_per_team, 1);
    }

    #[test]
    fn threads_cover_items_once() {
        for (num_items, num_streams, tpb, bpl) in [
            (1, 1, 256, 1),
            (2, 3, 32, 2),
            (17, 2, 4, 3),
            (1000, 3, 32, 4),
            (4096, 4, 64, 2),
            (12345, 1, 128, 7),
        ] {
            let geometry = LaunchGeometry::new(num_items, num_streams, nz(tpb), nz(bpl));
            let mut hits = vec![0u8; num_items];
            for stream in 0..num_streams {
                for team in 0..geometry.teams_per_stream {
                    for thread in 0..geometry.threads_per_team {
                        for n in geometry.thread_items(stream, team, thread) {
                            hits[n] += 1;
                        }
                    }
                }
            }
            assert!(hits.iter().all(|&h| h == 1), "{geometry:?}");
        }
    }
}
