/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2021 ZeroTier, Inc.
 * https://www.zerotier.com/
 */

use std::fmt::{Display, Formatter};

/// A parameter passed to a function or constructor was invalid.
#[derive(Debug, Clone, Copy)]
pub struct InvalidParameterError(pub &'static str);

impl Display for InvalidParameterError {
    #[inline(always)]
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str("invalid parameter: ")?;
        f.write_str(self.0)
    }
}

impl std::error::Error for InvalidParameterError {}

/// A string could not be parsed into the type it names.
#[derive(Debug, Clone, Copy)]
pub struct InvalidFormatError;

impl Display for InvalidFormatError {
    #[inline(always)]
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str("invalid format")
    }
}

impl std::error::Error for InvalidFormatError {}

/// A byte buffer did not contain a complete or sane encoding of the type being read.
#[derive(Debug, Clone, Copy)]
pub struct OutOfBoundsError;

impl Display for OutOfBoundsError {
    #[inline(always)]
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str("out of bounds")
    }
}

impl std::error::Error for OutOfBoundsError {}

impl From<std::io::Error> for OutOfBoundsError {
    #[inline(always)]
    fn from(_: std::io::Error) -> Self {
        OutOfBoundsError
    }
}
