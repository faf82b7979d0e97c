use bytes::Bytes;
use memchr::memmem;

/// A resolved stretch of the input: the bytes found before the next needle
/// occurrence (possibly none) and whether the needle itself followed them.
/// Needle bytes are never part of `data`.
#[derive(Debug)]
pub(crate) struct Region {
    pub(crate) data: Bytes,
    pub(crate) is_match: bool,
}

/// Streaming exact-match search over chunked input.
///
/// Each [`push`](StreamSearch::push) settles as much of the stream as it can
/// into [`Region`]s. Trailing bytes that could still turn out to open a
/// needle occurrence, at most `needle.len() - 1` of them, are withheld in a
/// carry buffer until a later chunk decides them.
#[derive(Debug)]
pub(crate) struct StreamSearch {
    finder: memmem::Finder<'static>,
    carry: Vec<u8>,
}

impl StreamSearch {
    pub(crate) fn new(needle: Vec<u8>) -> Self {
        debug_assert!(!needle.is_empty());
        let capacity = needle.len();
        StreamSearch {
            finder: memmem::Finder::new(&needle).into_owned(),
            carry: Vec::with_capacity(capacity),
        }
    }

    /// Feeds one chunk, appending every region it settles to `out`.
    pub(crate) fn push(&mut self, data: &Bytes, out: &mut Vec<Region>) {
        let m = self.finder.needle().len();
        if data.is_empty() {
            return;
        }

        // Offset into `data` up to which everything is settled.
        let mut pos = 0;

        if !self.carry.is_empty() {
            // An occurrence straddling the carry must end within the first
            // `m - 1` bytes of the new chunk.
            let take = usize::min(data.len(), m - 1);
            let mut border = Vec::with_capacity(self.carry.len() + take);
            border.extend_from_slice(&self.carry);
            border.extend_from_slice(&data[..take]);

            if let Some(at) = self.finder.find(&border) {
                debug_assert!(at < self.carry.len());
                out.push(Region {
                    data: Bytes::copy_from_slice(&self.carry[..at]),
                    is_match: true,
                });
                pos = at + m - self.carry.len();
                self.carry.clear();
            } else if data.len() >= m {
                // Any occurrence from here on lies fully inside `data`, so
                // the withheld bytes are settled as plain data.
                out.push(Region {
                    data: Bytes::copy_from_slice(&self.carry),
                    is_match: false,
                });
                self.carry.clear();
            } else {
                // Chunk shorter than the needle and nothing straddling:
                // absorb it and settle whatever can no longer open an
                // occurrence.
                self.carry.extend_from_slice(data);
                let keep = overlap(self.finder.needle(), &self.carry);
                let settle = self.carry.len() - keep;
                if settle > 0 {
                    out.push(Region {
                        data: Bytes::copy_from_slice(&self.carry[..settle]),
                        is_match: false,
                    });
                    self.carry.drain(..settle);
                }
                return;
            }
        }

        while let Some(rel) = self.finder.find(&data[pos..]) {
            let at = pos + rel;
            out.push(Region {
                data: data.slice(pos..at),
                is_match: true,
            });
            pos = at + m;
        }

        let keep = overlap(self.finder.needle(), &data[pos..]);
        let settled = data.len() - keep;
        if pos < settled {
            out.push(Region {
                data: data.slice(pos..settled),
                is_match: false,
            });
        }
        self.carry.extend_from_slice(&data[settled..]);
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.carry.len()
    }
}

/// Length of the longest suffix of `tail` that is also a proper prefix of
/// `needle`.
fn overlap(needle: &[u8], tail: &[u8]) -> usize {
    let max = usize::min(tail.len(), needle.len() - 1);
    (1..=max)
        .rev()
        .find(|&len| tail[tail.len() - len..] == needle[..len])
        .unwrap_or(0)
}
