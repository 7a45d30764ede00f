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

use std::env;
use std::path::PathBuf;

const WRAPPER_HEADER: &str = "wrapper.h";

fn main() {
    let dpdk = pkg_config::Config::new()
        .atleast_version("21.11")
        .probe("libdpdk")
        .expect("libdpdk not found via pkg-config; install a DPDK dev package or set PKG_CONFIG_PATH");

    for path in &dpdk.link_paths {
        println!("cargo:rustc-link-search=native={}", path.display());
    }
    for lib in &dpdk.libs {
        println!("cargo:rustc-link-lib=dylib={}", lib);
    }

    let bindings = bindgen::Builder::default()
        .header(WRAPPER_HEADER)
        .clang_args(dpdk.include_paths.iter().map(|p| format!("-I{}", p.display())))
        .allowlist_function("rte_eal_.*")
        .allowlist_function("rte_eth_.*")
        .allowlist_function("rte_lcore_.*")
        .allowlist_function("rte_get_next_lcore")
        .allowlist_function("rte_pktmbuf_.*")
        .allowlist_function("rte_delay_.*")
        .allowlist_function("rte_pause")
        .allowlist_function("rte_prefetch0")
        .allowlist_function("rte_socket_id")
        .allowlist_function("rte_srand")
        .allowlist_function("rte_rand")
        .allowlist_type("rte_mbuf")
        .allowlist_type("rte_mempool")
        .allowlist_type("rte_ether_addr")
        .allowlist_type("rte_eth_conf")
        .allowlist_type("rte_eth_txconf")
        .allowlist_type("rte_eth_rxconf")
        .allowlist_type("rte_lcore_state_t")
        .allowlist_var("RTE_PKTMBUF_HEADROOM")
        .parse_callbacks(Box::new(bindgen::CargoCallbacks))
        .generate()
        .expect("failed to generate DPDK bindings");

    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    bindings
        .write_to_file(out_path.join("bindings.rs"))
        .expect("failed to write DPDK bindings");

    cc::Build::new()
        .file("shim.c")
        .includes(dpdk.include_paths.iter())
        .compile("l2xfwd_ffi_shim");
}
