/*
* Copyright 2019 Comcast Cable Communications Management, LLC
*
* Licensed under the Apache License, Version 2.0 (the "License");
* you may not use this file except in compliance with the License.
* You may obtain a copy of the License at
*
* http://www.apache.org/licenses/LICENSE-2.0
*
* Unless required by applicable law or agreed to in writing, software
* distributed under the License is distributed on an "AS IS" BASIS,
* WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
* See the License for the specific language governing permissions and
* limitations under the License.
*
* SPDX-License-Identifier: Apache-2.0
*/

//! Best-effort disposal of rejected frames: append a metadata summary to
//! a timestamped dump file, then return the frame to its pool. Never
//! fails; an unopened dump file just means the frames are freed silently.

use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Local;

use crate::mbuf::{Frame, FramePool};

/// Format the dump file name for `when`: `DDMMYY.dump`, falling back to
/// the literal name `dump` if formatting ever produced something empty
/// (chrono's `strftime`-style formatting cannot actually fail here, but
/// the fallback mirrors the original's `strftime` error path).
pub fn dump_file_name(when: chrono::DateTime<Local>) -> String {
    let name = when.format("%d%m%y.dump").to_string();
    if name.is_empty() {
        "dump".to_string()
    } else {
        name
    }
}

/// Open (create or append) today's dump file in the current working
/// directory. Returns `None` on open failure — callers proceed without
/// dumping.
pub fn open_dump() -> Option<File> {
    let name = dump_file_name(Local::now());
    match OpenOptions::new().create(true).append(true).open(&name) {
        Ok(file) => Some(file),
        Err(err) => {
            tracing::warn!(error = %err, file = %name, "failed to open dump file");
            None
        }
    }
}

/// Open today's dump file, write a metadata summary (never the payload)
/// for each frame, then return every frame to `pool`. With no dump file
/// open, frames are returned to the pool without dumping. Never fails.
pub fn dump_and_free(pool: &FramePool, frames: Vec<Frame>) {
    if let Some(mut file) = open_dump() {
        for frame in &frames {
            if let Err(err) = writeln!(file, "{}", frame.summary()) {
                tracing::warn!(error = %err, "failed to write dump entry");
            }
        }
    }
    for frame in frames {
        pool.free(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_name_matches_ddmmyy_dump() {
        let when = Local.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        assert_eq!(dump_file_name(when), "280726.dump");
    }

    #[test]
    fn dump_and_free_frees_every_frame() {
        let pool = FramePool::new(4, crate::mbuf::DEFAULT_HEADROOM);
        let frames = vec![pool.allocate(10), pool.allocate(10)];
        dump_and_free(&pool, frames);
    }
}
