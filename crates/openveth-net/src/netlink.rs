//! Raw netlink operations for link plumbing.
//!
//! Minimal `NETLINK_ROUTE` client covering exactly what topology
//! plumbing needs: veth pair creation, moving endpoints across network
//! namespaces by file descriptor, renames, link state, bridge
//! enslavement, and address assignment.
//!
//! A [`NetlinkHandle`] operates on the namespace its socket was opened
//! in, so in-namespace steps must construct their handle after entering
//! the namespace.

use std::ffi::CString;
use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use ipnetwork::IpNetwork;

use crate::error::{NetError, Result};

const NETLINK_ROUTE: i32 = 0;

// Message types
const RTM_NEWLINK: u16 = 16;
const RTM_DELLINK: u16 = 17;
const RTM_NEWADDR: u16 = 20;

// Message flags
const NLM_F_REQUEST: u16 = 0x0001;
const NLM_F_ACK: u16 = 0x0004;
const NLM_F_EXCL: u16 = 0x0200;
const NLM_F_CREATE: u16 = 0x0400;

const IFF_UP: u32 = 0x1;

// RTM_NEWLINK attributes
const IFLA_IFNAME: u16 = 3;
const IFLA_MASTER: u16 = 10;
const IFLA_TXQLEN: u16 = 13;
const IFLA_LINKINFO: u16 = 18;
const IFLA_NET_NS_FD: u16 = 28;
const IFLA_INFO_KIND: u16 = 1;
const IFLA_INFO_DATA: u16 = 2;
const VETH_INFO_PEER: u16 = 1;

// RTM_NEWADDR attributes
const IFA_ADDRESS: u16 = 1;
const IFA_LOCAL: u16 = 2;

const NLA_F_NESTED: u16 = 1 << 15;

/// Netlink message header.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct NlMsgHdr {
    nlmsg_len: u32,
    nlmsg_type: u16,
    nlmsg_flags: u16,
    nlmsg_seq: u32,
    nlmsg_pid: u32,
}

/// Interface info message.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct IfInfoMsg {
    ifi_family: u8,
    _pad: u8,
    ifi_type: u16,
    ifi_index: i32,
    ifi_flags: u32,
    ifi_change: u32,
}

/// Interface address message.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct IfAddrMsg {
    ifa_family: u8,
    ifa_prefixlen: u8,
    ifa_flags: u8,
    ifa_scope: u8,
    ifa_index: u32,
}

/// Netlink attribute header.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct NlAttr {
    nla_len: u16,
    nla_type: u16,
}

fn as_bytes<T>(value: &T) -> &[u8] {
    // repr(C) plain-data structs only.
    unsafe { std::slice::from_raw_parts((value as *const T).cast::<u8>(), mem::size_of::<T>()) }
}

/// Kind of interface created with [`NetlinkHandle::create_link`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// Linux bridge.
    Bridge,
    /// Dummy interface (tests).
    Dummy,
}

impl LinkType {
    const fn kind(self) -> &'static str {
        match self {
            Self::Bridge => "bridge",
            Self::Dummy => "dummy",
        }
    }
}

/// Netlink socket handle.
///
/// Bound to the network namespace the socket was created in.
pub struct NetlinkHandle {
    fd: OwnedFd,
    seq: u32,
}

impl NetlinkHandle {
    /// Creates a netlink socket in the current namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be created or bound.
    pub fn new() -> Result<Self> {
        let fd = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                NETLINK_ROUTE,
            )
        };
        if fd < 0 {
            return Err(NetError::Netlink(format!(
                "failed to create netlink socket: {}",
                io::Error::last_os_error()
            )));
        }

        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as u16;
        addr.nl_pid = 0; // kernel assigns
        addr.nl_groups = 0;
        let ret = unsafe {
            libc::bind(
                fd,
                std::ptr::addr_of!(addr).cast::<libc::sockaddr>(),
                mem::size_of::<libc::sockaddr_nl>() as u32,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(NetError::Netlink(format!(
                "failed to bind netlink socket: {err}"
            )));
        }

        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
            seq: 0,
        })
    }

    fn next_seq(&mut self) -> u32 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    /// Sends a request and waits for the kernel's acknowledgement.
    fn send_and_ack(&mut self, msg: &[u8]) -> Result<()> {
        let sent = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                msg.as_ptr().cast::<libc::c_void>(),
                msg.len(),
                0,
            )
        };
        if sent < 0 {
            return Err(NetError::Netlink(format!(
                "failed to send netlink message: {}",
                io::Error::last_os_error()
            )));
        }

        let mut buf = [0u8; 4096];
        let len = unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
                0,
            )
        };
        if len < 0 {
            return Err(NetError::Netlink(format!(
                "failed to receive netlink response: {}",
                io::Error::last_os_error()
            )));
        }

        // NLMSG_ERROR with code 0 is the ack.
        if len >= mem::size_of::<NlMsgHdr>() as isize {
            let hdr = unsafe { &*buf.as_ptr().cast::<NlMsgHdr>() };
            if hdr.nlmsg_type == libc::NLMSG_ERROR as u16
                && len >= (mem::size_of::<NlMsgHdr>() + 4) as isize
            {
                let code =
                    unsafe { *buf.as_ptr().add(mem::size_of::<NlMsgHdr>()).cast::<i32>() };
                if code != 0 {
                    return Err(NetError::Netlink(format!(
                        "netlink error: {}",
                        io::Error::from_raw_os_error(-code)
                    )));
                }
            }
        }

        Ok(())
    }

    /// Starts an RTM_NEWLINK/RTM_DELLINK message body for `ifindex`
    /// (0 when creating).
    fn start_link_msg(ifindex: i32) -> Vec<u8> {
        let mut msg = Vec::with_capacity(256);
        msg.extend_from_slice(&[0u8; mem::size_of::<NlMsgHdr>()]);
        let ifinfo = IfInfoMsg {
            ifi_family: libc::AF_UNSPEC as u8,
            ifi_index: ifindex,
            ..Default::default()
        };
        msg.extend_from_slice(as_bytes(&ifinfo));
        msg
    }

    /// Patches the header in and sends the finished message.
    fn send_msg(&mut self, mut msg: Vec<u8>, msg_type: u16, flags: u16) -> Result<()> {
        let hdr = NlMsgHdr {
            nlmsg_len: msg.len() as u32,
            nlmsg_type: msg_type,
            nlmsg_flags: flags,
            nlmsg_seq: self.next_seq(),
            nlmsg_pid: 0,
        };
        msg[..mem::size_of::<NlMsgHdr>()].copy_from_slice(as_bytes(&hdr));
        self.send_and_ack(&msg)
    }

    /// Creates a single interface of the given kind and returns its
    /// index.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface cannot be created.
    pub fn create_link(&mut self, name: &str, link_type: LinkType) -> Result<u32> {
        let mut msg = Self::start_link_msg(0);
        add_attr_string(&mut msg, IFLA_IFNAME, name);

        let linkinfo = begin_nested(&mut msg, IFLA_LINKINFO);
        add_attr_string(&mut msg, IFLA_INFO_KIND, link_type.kind());
        end_nested(&mut msg, linkinfo);

        self.send_msg(
            msg,
            RTM_NEWLINK,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
        )?;
        self.get_ifindex(name)
    }

    /// Creates a veth pair in the current namespace.
    ///
    /// Both ends are created down; `txqueue_len`, when given, applies
    /// to both ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the pair cannot be created (e.g. a name is
    /// taken).
    pub fn create_veth_pair(
        &mut self,
        name: &str,
        peer_name: &str,
        txqueue_len: Option<u32>,
    ) -> Result<()> {
        let mut msg = Self::start_link_msg(0);
        add_attr_string(&mut msg, IFLA_IFNAME, name);
        if let Some(qlen) = txqueue_len {
            add_attr_u32(&mut msg, IFLA_TXQLEN, qlen);
        }

        let linkinfo = begin_nested(&mut msg, IFLA_LINKINFO);
        add_attr_string(&mut msg, IFLA_INFO_KIND, "veth");

        let info_data = begin_nested(&mut msg, IFLA_INFO_DATA);
        let peer = begin_nested(&mut msg, VETH_INFO_PEER);
        // The peer attribute payload is a full ifinfomsg followed by
        // the peer's own attributes.
        msg.extend_from_slice(as_bytes(&IfInfoMsg {
            ifi_family: libc::AF_UNSPEC as u8,
            ..Default::default()
        }));
        add_attr_string(&mut msg, IFLA_IFNAME, peer_name);
        if let Some(qlen) = txqueue_len {
            add_attr_u32(&mut msg, IFLA_TXQLEN, qlen);
        }
        end_nested(&mut msg, peer);
        end_nested(&mut msg, info_data);
        end_nested(&mut msg, linkinfo);

        self.send_msg(
            msg,
            RTM_NEWLINK,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
        )
    }

    /// Deletes an interface. Deleting one end of a veth pair destroys
    /// both ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface cannot be deleted.
    pub fn delete_link(&mut self, ifindex: u32) -> Result<()> {
        let msg = Self::start_link_msg(ifindex as i32);
        self.send_msg(msg, RTM_DELLINK, NLM_F_REQUEST | NLM_F_ACK)
    }

    /// Brings an interface up or down.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be changed.
    pub fn set_link_state(&mut self, ifindex: u32, up: bool) -> Result<()> {
        let mut msg = Vec::with_capacity(64);
        msg.extend_from_slice(&[0u8; mem::size_of::<NlMsgHdr>()]);
        let ifinfo = IfInfoMsg {
            ifi_family: libc::AF_UNSPEC as u8,
            ifi_index: ifindex as i32,
            ifi_flags: if up { IFF_UP } else { 0 },
            ifi_change: IFF_UP,
            ..Default::default()
        };
        msg.extend_from_slice(as_bytes(&ifinfo));
        self.send_msg(msg, RTM_NEWLINK, NLM_F_REQUEST | NLM_F_ACK)
    }

    /// Renames an interface. The interface must be down.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails.
    pub fn set_link_name(&mut self, ifindex: u32, name: &str) -> Result<()> {
        let mut msg = Self::start_link_msg(ifindex as i32);
        add_attr_string(&mut msg, IFLA_IFNAME, name);
        self.send_msg(msg, RTM_NEWLINK, NLM_F_REQUEST | NLM_F_ACK)
    }

    /// Moves an interface into the namespace referenced by `ns_fd`.
    ///
    /// After the move the interface is no longer visible through this
    /// handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the move fails.
    pub fn set_link_netns(&mut self, ifindex: u32, ns_fd: RawFd) -> Result<()> {
        let mut msg = Self::start_link_msg(ifindex as i32);
        add_attr_u32(&mut msg, IFLA_NET_NS_FD, ns_fd as u32);
        self.send_msg(msg, RTM_NEWLINK, NLM_F_REQUEST | NLM_F_ACK)
    }

    /// Enslaves an interface to a bridge (`master_ifindex` 0 releases
    /// it).
    ///
    /// # Errors
    ///
    /// Returns an error if the master cannot be set.
    pub fn set_link_master(&mut self, ifindex: u32, master_ifindex: u32) -> Result<()> {
        let mut msg = Self::start_link_msg(ifindex as i32);
        add_attr_u32(&mut msg, IFLA_MASTER, master_ifindex);
        self.send_msg(msg, RTM_NEWLINK, NLM_F_REQUEST | NLM_F_ACK)
    }

    /// Adds an IP address to an interface.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be added.
    pub fn add_address(&mut self, ifindex: u32, addr: IpNetwork) -> Result<()> {
        let mut msg = Vec::with_capacity(64);
        msg.extend_from_slice(&[0u8; mem::size_of::<NlMsgHdr>()]);

        let family = match addr {
            IpNetwork::V4(_) => libc::AF_INET as u8,
            IpNetwork::V6(_) => libc::AF_INET6 as u8,
        };
        let ifaddr = IfAddrMsg {
            ifa_family: family,
            ifa_prefixlen: addr.prefix(),
            ifa_flags: 0,
            ifa_scope: 0,
            ifa_index: ifindex,
        };
        msg.extend_from_slice(as_bytes(&ifaddr));

        match addr {
            IpNetwork::V4(v4) => {
                let octets = v4.ip().octets();
                add_attr_bytes(&mut msg, IFA_LOCAL, &octets);
                add_attr_bytes(&mut msg, IFA_ADDRESS, &octets);
            }
            IpNetwork::V6(v6) => {
                let octets = v6.ip().octets();
                add_attr_bytes(&mut msg, IFA_LOCAL, &octets);
                add_attr_bytes(&mut msg, IFA_ADDRESS, &octets);
            }
        }

        self.send_msg(
            msg,
            RTM_NEWADDR,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
        )
    }

    /// Looks up an interface index by name in the handle's namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface is not found.
    pub fn get_ifindex(&self, name: &str) -> Result<u32> {
        let c_name = CString::new(name).map_err(|e| NetError::Netlink(e.to_string()))?;
        let ifindex = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
        if ifindex == 0 {
            return Err(NetError::Netlink(format!("interface not found: {name}")));
        }
        Ok(ifindex)
    }
}

/// Opens a nested attribute; returns the patch position for
/// [`end_nested`].
fn begin_nested(msg: &mut Vec<u8>, attr_type: u16) -> (usize, u16) {
    let start = msg.len();
    msg.extend_from_slice(&[0u8; mem::size_of::<NlAttr>()]);
    (start, attr_type)
}

fn end_nested(msg: &mut [u8], (start, attr_type): (usize, u16)) {
    let attr = NlAttr {
        nla_len: (msg.len() - start) as u16,
        nla_type: attr_type | NLA_F_NESTED,
    };
    msg[start..start + mem::size_of::<NlAttr>()].copy_from_slice(as_bytes(&attr));
}

fn add_attr_string(msg: &mut Vec<u8>, attr_type: u16, value: &str) {
    let bytes = value.as_bytes();
    let attr_len = mem::size_of::<NlAttr>() + bytes.len() + 1; // NUL-terminated
    push_attr_header(msg, attr_type, attr_len);
    msg.extend_from_slice(bytes);
    msg.push(0);
    pad_to_align(msg, attr_len);
}

fn add_attr_u32(msg: &mut Vec<u8>, attr_type: u16, value: u32) {
    let attr_len = mem::size_of::<NlAttr>() + mem::size_of::<u32>();
    push_attr_header(msg, attr_type, attr_len);
    msg.extend_from_slice(&value.to_ne_bytes());
}

fn add_attr_bytes(msg: &mut Vec<u8>, attr_type: u16, value: &[u8]) {
    let attr_len = mem::size_of::<NlAttr>() + value.len();
    push_attr_header(msg, attr_type, attr_len);
    msg.extend_from_slice(value);
    pad_to_align(msg, attr_len);
}

fn push_attr_header(msg: &mut Vec<u8>, attr_type: u16, attr_len: usize) {
    let attr = NlAttr {
        nla_len: attr_len as u16,
        nla_type: attr_type,
    };
    msg.extend_from_slice(as_bytes(&attr));
}

fn pad_to_align(msg: &mut Vec<u8>, attr_len: usize) {
    let padded = (attr_len + 3) & !3;
    msg.extend(std::iter::repeat(0).take(padded - attr_len));
}
