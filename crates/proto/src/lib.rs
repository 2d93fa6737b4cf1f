// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generated `tonic`/`prost` bindings for the `Job` gRPC service.

tonic::include_proto!("job");